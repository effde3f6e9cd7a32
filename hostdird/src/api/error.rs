use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use crate::directory::DirectoryError;
use crate::settings::SettingsError;

/// Everything a handler can fail with, mapped onto a status and a JSON body.
#[derive(Debug)]
pub enum ApiError {
    Directory(DirectoryError),
    Settings(SettingsError),
    BadBody(String),
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        Self::Directory(err)
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        Self::Settings(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => Self::BadBody("Body must be JSON.".to_string()),
            other => Self::BadBody(other.body_text()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Directory(DirectoryError::NotFound) => StatusCode::NOT_FOUND,
            Self::Directory(DirectoryError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Directory(DirectoryError::StorageUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Directory(DirectoryError::DirectoryFull { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Settings(SettingsError::Unauthorized) => StatusCode::UNAUTHORIZED,
            Self::Settings(SettingsError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Settings(SettingsError::StorageUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Directory(e) => e.to_string(),
            Self::Settings(e) => e.to_string(),
            Self::BadBody(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", message);
        }
        (status, Json(json!({ "body": message }))).into_response()
    }
}
