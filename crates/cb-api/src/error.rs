//! Maps forum errors onto HTTP responses with a `{ "error": ... }` body.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use cb_core::AppError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    /// The request body could not be decoded.
    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(AppError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ApiError::App(AppError::NotFound(..)) => StatusCode::NOT_FOUND,
            ApiError::App(AppError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::App(AppError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::App(AppError::Storage(detail)) => {
                log::error!("request failed on storage: {detail}");
                "Failed to save changes".to_string()
            }
            ApiError::App(AppError::NotFound(kind, _)) => format!("{} not found", capitalize(kind)),
            ApiError::App(AppError::ValidationError(msg) | AppError::Forbidden(msg)) => {
                capitalize(msg)
            }
            ApiError::BadRequest(msg) => msg.clone(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
