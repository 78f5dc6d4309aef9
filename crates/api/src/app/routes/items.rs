use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use fleamarket_catalog::{CreateItemInput, ItemView, SearchItemsInput, UpdateItemInput, Validate};
use fleamarket_core::ItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/stats", get(statistics))
        .route("/:id", get(get_item).put(update_item).delete(delete_item))
        .route("/:id/purchase", post(purchase_item))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<CreateItemInput>, JsonRejection>,
) -> axum::response::Response {
    let Some(owner_id) = actor.user_id() else {
        return errors::missing_actor();
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return dto::body_rejection(rejection),
    };
    let input = match body.validated() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.marketplace.create_item(owner_id, input).await {
        Ok(details) => (StatusCode::CREATED, Json(ItemView::from(details))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<SearchItemsInput>, QueryRejection>,
) -> axum::response::Response {
    let Query(search) = match query {
        Ok(q) => q,
        Err(rejection) => return dto::query_rejection(rejection),
    };
    let input = match search.validated() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.marketplace.list_items(input).await {
        Ok(page) => Json(page.map(ItemView::from)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.marketplace.find_item(id).await {
        Ok(details) => Json(ItemView::from(details)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateItemInput>, JsonRejection>,
) -> axum::response::Response {
    let id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return dto::body_rejection(rejection),
    };
    let input = match body.validated() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.marketplace.update_item(id, input).await {
        Ok(details) => Json(ItemView::from(details)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.marketplace.delete_item(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn purchase_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(buyer_id) = actor.user_id() else {
        return errors::missing_actor();
    };
    let id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.marketplace.purchase_item(id, buyer_id).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn statistics(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.marketplace.statistics().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
