use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use fleamarket_core::UserId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-user-id";

/// Attach an [`ActorContext`] to every request.
///
/// A missing header yields an anonymous context; a malformed one is rejected.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let actor = extract_actor(req.headers()).map_err(|msg| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_actor", msg)
    })?;

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

fn extract_actor(headers: &HeaderMap) -> Result<ActorContext, String> {
    let Some(header) = headers.get(ACTOR_HEADER) else {
        return Ok(ActorContext::anonymous());
    };

    let header = header
        .to_str()
        .map_err(|_| format!("{ACTOR_HEADER} must be visible ASCII"))?;
    let user_id: UserId = header.parse().map_err(|e| format!("{e}"))?;

    Ok(ActorContext::new(user_id))
}
