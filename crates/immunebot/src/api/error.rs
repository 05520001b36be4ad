//! API error responses
//!
//! Every error is rendered as `{"message": ..., "fields": {...}}`, `fields` only
//! for validation failures.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use immunecore::AppError;
use serde::Serialize;
use thiserror::Error;

/// Field name to its validation messages
pub type InvalidFields = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid certificate data")]
    Validation(InvalidFields),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(AppError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a InvalidFields>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::CertificateNotFound => ApiError::NotFound,
            AppError::Validation(message) => ApiError::BadRequest(message),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                log::error!("API request failed: {}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let fields = match &self {
            ApiError::Validation(fields) => Some(fields),
            _ => None,
        };

        (status, Json(ErrorBody { message, fields })).into_response()
    }
}
