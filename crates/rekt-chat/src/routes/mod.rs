//! Request handlers

pub mod chats;
pub mod markets;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::{ApiError, ApiResult};

/// Unwrap a JSON body, answering 400 with a JSON error on rejection
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Parse an optional numeric query parameter
pub(crate) fn parse_param<T: std::str::FromStr>(
    name: &str,
    raw: Option<&str>,
) -> ApiResult<Option<T>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {}: '{}'", name, value))),
        None => Ok(None),
    }
}

/// Non-empty trimmed string
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
