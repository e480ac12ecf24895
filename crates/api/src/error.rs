//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::{ErrorKind, FulfillmentError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path, header or body.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or unparseable `X-User-Id` header.
    #[error("{0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Fulfillment(err) => fulfillment_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string())
            .increment(1);

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_status(err: &FulfillmentError) -> StatusCode {
    match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::InsufficientStock
        | ErrorKind::InvalidTransition
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        // Refused reservation, not a backend failure.
        ErrorKind::StockUpdateFailed if err.stock_refusal().is_some() => StatusCode::CONFLICT,
        ErrorKind::StockUpdateFailed | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use domain::{OrderStatus, ProductId, StockError, UserId};
    use store::StoreError;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                FulfillmentError::CartNotFound(UserId::new()),
                StatusCode::NOT_FOUND,
            ),
            (FulfillmentError::CartEmpty, StatusCode::BAD_REQUEST),
            (
                FulfillmentError::InsufficientStock {
                    product_id: ProductId::new(),
                    name: "Q".to_string(),
                    requested: 1,
                    available: 0,
                },
                StatusCode::CONFLICT,
            ),
            (
                FulfillmentError::NotCancellable(OrderStatus::Shipped),
                StatusCode::CONFLICT,
            ),
            (FulfillmentError::Unauthorized, StatusCode::FORBIDDEN),
            (
                FulfillmentError::DuplicateSku("SKU-1".to_string()),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_stock_update_failures() {
        let refused = FulfillmentError::StockUpdateFailed(StoreError::Stock(
            StockError::InsufficientStock {
                product_id: ProductId::new(),
                name: "P".to_string(),
                requested: 2,
                available: 1,
            },
        ));
        assert_eq!(ApiError::from(refused).status(), StatusCode::CONFLICT);

        let backend = FulfillmentError::StockUpdateFailed(StoreError::Unavailable(
            "connection reset".to_string(),
        ));
        assert_eq!(
            ApiError::from(backend).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = ApiError::from(FulfillmentError::Store(StoreError::InvalidRow(
            "stock out of range".to_string(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
