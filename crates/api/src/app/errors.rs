use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fleamarket_core::DomainError;

/// Map an orchestrator error to a JSON response.
///
/// | DomainError | Status |
/// |-------------|--------|
/// | `NotFound` | 404 |
/// | `InvalidInput` | 400 |
/// | `BusinessRuleViolation` | 422 |
/// | `Infrastructure` | 500 |
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::NotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        DomainError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_input", msg),
        DomainError::BusinessRuleViolation(rule) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "business_rule_violation",
                "rule": rule.as_str(),
                "message": rule.to_string(),
            })),
        )
            .into_response(),
        DomainError::Infrastructure(msg) => {
            // Storage details stay in the logs.
            tracing::error!(error = %msg, "infrastructure failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "infrastructure_error",
                "internal error",
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn missing_actor() -> axum::response::Response {
    json_error(
        StatusCode::UNAUTHORIZED,
        "missing_actor",
        "X-User-Id header is required",
    )
}

#[cfg(test)]
mod tests {
    use fleamarket_core::BusinessRule;

    use super::*;

    #[test]
    fn each_error_kind_has_its_status() {
        let cases = [
            (DomainError::not_found("item", "x"), StatusCode::NOT_FOUND),
            (DomainError::invalid_input("bad"), StatusCode::BAD_REQUEST),
            (
                DomainError::rule(BusinessRule::AlreadySoldOut),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DomainError::infrastructure("db down"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
