use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    cache::{CacheError, CallError},
    infra::error::InfraError,
};

/// Diagnostic attached to error responses and read back by the response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::Cache(CacheError::InvalidGlob { .. })
            | AppError::Infra(InfraError::RequestUrl { .. }) => StatusCode::BAD_REQUEST,
            AppError::Cache(CacheError::Storage { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(InfraError::Configuration { .. })
            | AppError::Infra(InfraError::Telemetry(_))
            | AppError::Infra(InfraError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::NotFound => "Resource not found",
            AppError::Validation(_) | AppError::Cache(CacheError::InvalidGlob { .. }) => {
                "Request could not be processed"
            }
            AppError::Infra(InfraError::RequestUrl { .. }) => "Malformed request target",
            AppError::Cache(CacheError::Storage { .. }) => "Service temporarily unavailable",
            AppError::Cache(_) => "Cache failure during request",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl From<CallError<AppError>> for AppError {
    fn from(error: CallError<AppError>) -> Self {
        match error {
            CallError::Fetch(inner) => inner,
            CallError::Cache(inner) => AppError::Cache(inner),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_unwrap_to_the_application_error() {
        let err = AppError::from(CallError::Fetch(AppError::NotFound));
        assert!(matches!(err, AppError::NotFound));

        let err = AppError::from(CallError::<AppError>::Cache(CacheError::MissingContext));
        assert!(matches!(err, AppError::Cache(CacheError::MissingContext)));
    }

    #[test]
    fn responses_carry_an_error_report() {
        let response = AppError::validation("bad id").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "application::error::AppError");
        assert_eq!(report.messages, vec!["validation failed: bad id"]);
    }

    #[test]
    fn invalid_glob_is_a_client_error() {
        let response = AppError::from(CacheError::invalid_glob("[", "bad")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
