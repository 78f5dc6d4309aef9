use axum::{routing::get, Router};

pub mod categories;
pub mod items;
pub mod system;
pub mod users;

/// Router for every endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/ping", get(system::ping))
        .nest("/items", items::router())
        .nest("/users", users::router())
        .nest("/categories", categories::router())
}
