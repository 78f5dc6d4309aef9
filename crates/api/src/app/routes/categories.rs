use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use fleamarket_catalog::{CreateCategoryInput, Validate};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", get(list_categories).post(create_category))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.marketplace.list_categories().await {
        Ok(categories) => Json(
            categories
                .into_iter()
                .map(dto::CategoryResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CreateCategoryInput>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return dto::body_rejection(rejection),
    };
    let input = match body.validated() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.marketplace.create_category(input).await {
        Ok(category) => {
            (StatusCode::CREATED, Json(dto::CategoryResponse::from(category))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}
