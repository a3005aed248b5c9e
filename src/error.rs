//! Error types for the session, user, file-tree and job layers, plus the
//! HTTP-facing `ApiError` they all collapse into.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the session manager.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The Authorization header did not decode to `email:password`.
    #[error("malformed credentials")]
    MalformedCredentials,

    /// No user matches the supplied email and password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Logout of a token that has no live session.
    #[error("session not found")]
    NotFound,

    #[error("upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Failures of user registration and lookup.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("missing email")]
    MissingEmail,

    #[error("missing password")]
    MissingPassword,

    /// A user with this email already exists.
    #[error("user already exists")]
    Conflict,

    #[error("upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Failures of the file tree service.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("missing {0}")]
    MissingField(&'static str),

    /// `type` was absent or not one of folder/file/image.
    #[error("invalid file kind")]
    InvalidKind,

    /// A file or image upload without content.
    #[error("missing content")]
    MissingContent,

    #[error("parent not found")]
    ParentNotFound,

    #[error("parent is not a folder")]
    ParentNotFolder,

    /// Covers true absence, ownership mismatch and private access alike.
    #[error("not found")]
    NotFound,

    #[error("a folder has no content")]
    NotAFile,

    #[error("upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Failures of a single job attempt in the worker.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Missing fileId")]
    MissingFileId,

    #[error("Missing userId")]
    MissingUserId,

    #[error("File not found")]
    FileNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("resize to width {width} failed: {source}")]
    Resize {
        width: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Error returned by HTTP handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::MalformedCredentials
            | SessionError::InvalidCredentials
            | SessionError::NotFound => ApiError::unauthorized(),
            SessionError::Upstream(e) => {
                tracing::error!("session upstream failure: {e:#}");
                ApiError::internal()
            }
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::MissingEmail => ApiError::bad_request("Missing email"),
            UserError::MissingPassword => ApiError::bad_request("Missing password"),
            UserError::Conflict => ApiError::bad_request("Already exist"),
            UserError::Upstream(e) => {
                tracing::error!("user upstream failure: {e:#}");
                ApiError::internal()
            }
        }
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::MissingField(field) => ApiError::bad_request(format!("Missing {field}")),
            FileError::InvalidKind => ApiError::bad_request("Missing type"),
            FileError::MissingContent => ApiError::bad_request("Missing data"),
            FileError::ParentNotFound => ApiError::bad_request("Parent not found"),
            FileError::ParentNotFolder => ApiError::bad_request("Parent is not a folder"),
            FileError::NotFound => ApiError::not_found(),
            FileError::NotAFile => ApiError::bad_request("A folder doesn't have content"),
            FileError::Upstream(e) => {
                tracing::error!("file upstream failure: {e:#}");
                ApiError::internal()
            }
        }
    }
}
