//! Application error types.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::content::ContentError;
use crate::store::StoreError;

/// Validation messages keyed by field name.
///
/// Serializes as `{"field": ["message", ...]}`, the shape REST clients of
/// this module expect for 400 responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Merge another set of errors, prefixing each key with `prefix.`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        for (field, messages) in other.0 {
            let key = format!("{prefix}.{field}");
            self.0.entry(key).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// All messages, flattened in field order.
    pub fn messages(&self) -> Vec<String> {
        self.0.values().flatten().cloned().collect()
    }

    /// `Ok(value)` when empty, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::BadRequest(msg),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Other(e) => AppError::Internal(e),
        }
    }
}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound => AppError::NotFound,
            ContentError::Forbidden => AppError::Forbidden,
            ContentError::Validation(errors) => AppError::Validation(errors),
            ContentError::PolicyDisabled => {
                AppError::BadRequest("publication policies are disabled".to_string())
            }
            ContentError::Store(e) => e.into(),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-facing message. Internal details are logged, never returned.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, self.public_message()).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

/// [`AppError`] rendered as JSON for the REST API.
///
/// Validation errors become the field map; everything else is
/// `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError(AppError::Unauthorized)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        ApiError(err.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = match self.0 {
            AppError::Validation(errors) => return (status, Json(errors)).into_response(),
            AppError::NotFound => json!({"detail": "Not found."}),
            AppError::Unauthorized => {
                json!({"detail": "Authentication credentials were not provided."})
            }
            AppError::Forbidden => {
                json!({"detail": "You do not have permission to perform this action."})
            }
            other => json!({"detail": other.public_message()}),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for JSON handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Key for messages that do not belong to one field.
const NON_FIELD_KEY: &str = "detail";

/// JSON request body that rejects like a validation error: 400 with the
/// field map, instead of axum's plain-text 415/422.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::Validation(rejection_errors(&rejection)).into()),
        }
    }
}

/// A type error at `title` is reported under `title`, anything else under
/// [`NON_FIELD_KEY`].
fn rejection_errors(rejection: &JsonRejection) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let text = rejection.body_text();
    match rejection {
        JsonRejection::JsonDataError(_) => {
            let detail = text
                .split_once("target type: ")
                .map_or(text.as_str(), |(_, detail)| detail);
            let detail = without_position(detail);
            match detail.split_once(": ") {
                Some((path, message)) if !path.contains(' ') => errors.add(path, message),
                _ => errors.add(NON_FIELD_KEY, detail),
            }
        }
        JsonRejection::JsonSyntaxError(_) => {
            let detail = text
                .split_once("as JSON: ")
                .map_or(text.as_str(), |(_, detail)| detail);
            errors.add(NON_FIELD_KEY, format!("JSON parse error - {detail}"));
        }
        _ => errors.add(NON_FIELD_KEY, text),
    }
    errors
}

/// Drop serde_json's trailing ` at line N column M`.
fn without_position(message: &str) -> &str {
    match message.rsplit_once(" at line ") {
        Some((head, tail))
            if tail
                .split(" column ")
                .all(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())) =>
        {
            head
        }
        _ => message,
    }
}
