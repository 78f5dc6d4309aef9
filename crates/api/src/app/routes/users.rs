use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use fleamarket_catalog::{RegisterUserInput, Validate};
use fleamarket_core::UserId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_user))
        .route("/:id", get(get_user))
}

pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegisterUserInput>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return dto::body_rejection(rejection),
    };
    let input = match body.validated() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.marketplace.register_user(input).await {
        Ok(user) => (StatusCode::CREATED, Json(dto::UserResponse::from(user))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UserId = match dto::parse_id(&id, "user") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.marketplace.find_user(id).await {
        Ok(user) => Json(dto::UserResponse::from(user)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
