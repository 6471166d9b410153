use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), AccountError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AccountError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, msg) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {msg}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{field} already registered")]
    Conflict { field: &'static str },

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token is invalid or has expired")]
    InvalidResetToken,

    #[error("password changed after the token was issued")]
    TokenRevoked,

    #[error("user not found")]
    NotFound,

    #[error("user was modified by another write")]
    WriteConflict,

    #[error("reset email could not be delivered")]
    Delivery(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type AccountResult<T> = Result<T, AccountError>;

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::Validation(_) => StatusCode::BAD_REQUEST,
            AccountError::Conflict { .. } | AccountError::WriteConflict => StatusCode::CONFLICT,
            AccountError::InvalidCredentials | AccountError::TokenRevoked => {
                StatusCode::UNAUTHORIZED
            }
            AccountError::InvalidResetToken => StatusCode::BAD_REQUEST,
            AccountError::NotFound => StatusCode::NOT_FOUND,
            AccountError::Hashing(_) | AccountError::Delivery(_) | AccountError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AccountError::Validation(fields) => json!({
                "status": "fail",
                "message": "Invalid input data",
                "errors": fields,
            }),
            e if status.is_server_error() => {
                error!(error = ?e, "request failed");
                json!({ "status": "error", "message": "Something went wrong" })
            }
            e => json!({ "status": "fail", "message": e.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_first_message_per_field() {
        let mut errs = ValidationErrors::default();
        errs.add("email", "Email is required");
        errs.add("email", "Invalid email");
        assert_eq!(errs.get("email"), Some("Email is required"));
        assert!(errs.into_result().is_err());
    }

    #[test]
    fn empty_validation_errors_pass() {
        assert!(ValidationErrors::default().into_result().is_ok());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            AccountError::Conflict { field: "email" }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AccountError::Hashing("oom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AccountError::Validation(ValidationErrors::default()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AccountError::TokenRevoked.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AccountError::WriteConflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn reset_token_error_does_not_say_which_check_failed() {
        assert_eq!(
            AccountError::InvalidResetToken.to_string(),
            "token is invalid or has expired"
        );
    }
}
