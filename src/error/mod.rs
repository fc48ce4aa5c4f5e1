use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::template::TemplateError;

/// Request-terminating failures. Each maps to one status code and a
/// plain-text description.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed request parameters or body.
    #[error("{0}")]
    Input(String),

    /// Template URL rejected by the host whitelist.
    #[error("{0}")]
    Policy(String),

    /// Remote fetch failed, or the template text does not parse.
    #[error("{0}")]
    Upstream(String),

    /// Template failed while executing against the request's variables.
    #[error("{0}")]
    Render(String),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Input(_) | AppError::Render(_) => StatusCode::BAD_REQUEST,
            AppError::Policy(_) | AppError::Upstream(_) => StatusCode::FORBIDDEN,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Input(_) => "INPUT_ERROR",
            AppError::Policy(_) => "POLICY_ERROR",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Render(_) => "RENDER_ERROR",
            AppError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Parse { .. } => AppError::Upstream(format!("Parse template: {}", err)),
            TemplateError::Execute { .. } => AppError::Render(format!("Render template: {}", err)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        tracing::warn!(
            code = %self.code(),
            status = %status.as_u16(),
            message = %self,
            "Request rejected"
        );

        let body = match self {
            AppError::MethodNotAllowed => String::new(),
            other => format!("{}\n", other),
        };

        (
            status,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                ),
                (
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ),
            ],
            body,
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
