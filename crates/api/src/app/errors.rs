use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use pos_core::DomainError;
use pos_infra::store::StoreError;
use pos_sales::OrderError;

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

/// Map an order-creation outcome to HTTP, carrying the offending ids and
/// quantities so a client can correct the request.
pub fn order_error_to_response(err: OrderError) -> axum::response::Response {
    let code = err.code();
    let message = err.to_string();
    let (status, body) = match &err {
        OrderError::CustomerNotFound(id) => (
            StatusCode::NOT_FOUND,
            json!({ "error": code, "message": message, "customer_id": id.to_string() }),
        ),
        OrderError::ProductNotFound(id) => (
            StatusCode::NOT_FOUND,
            json!({ "error": code, "message": message, "product_id": id.to_string() }),
        ),
        OrderError::InsufficientStock {
            product_id,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            json!({
                "error": code,
                "message": message,
                "product_id": product_id.to_string(),
                "requested": requested,
                "available": available,
            }),
        ),
        OrderError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, json!({ "error": code, "message": message })),
        OrderError::PersistenceFailure { transient, .. } => {
            tracing::error!(error = %err, transient, "order persistence failure");
            let status = if *transient {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, json!({ "error": code, "message": message, "retryable": transient }))
        }
    };
    (status, axum::Json(body)).into_response()
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        e @ DomainError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

/// Map catalog store failures (CRUD paths, not order creation).
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Transient(msg) => {
            tracing::warn!(error = %msg, "transient store failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
        other @ (StoreError::ProductNotFound(_) | StoreError::InsufficientStock { .. }) => {
            order_error_to_response(other.into())
        }
    }
}

/// A body that is not valid JSON for the endpoint is a bad request.
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    tracing::debug!(error = %rejection, "rejected request body");
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn forbidden(err: pos_auth::AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_core::ProductId;

    #[test]
    fn order_errors_map_to_statuses() {
        let cases = [
            (OrderError::CustomerNotFound(pos_core::CustomerId::new()), StatusCode::NOT_FOUND),
            (OrderError::ProductNotFound(ProductId::new()), StatusCode::NOT_FOUND),
            (
                OrderError::InsufficientStock {
                    product_id: ProductId::new(),
                    requested: 2,
                    available: 0,
                },
                StatusCode::CONFLICT,
            ),
            (OrderError::invalid("empty"), StatusCode::BAD_REQUEST),
            (OrderError::persistence("fk"), StatusCode::INTERNAL_SERVER_ERROR),
            (OrderError::transient("lock timeout"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(order_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(
            store_error_to_response(StoreError::Domain(DomainError::not_found("product", ProductId::new()))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            store_error_to_response(StoreError::Domain(DomainError::conflict("referenced"))).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            store_error_to_response(StoreError::Domain(DomainError::validation("bad"))).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            store_error_to_response(StoreError::transient("pool timed out")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
