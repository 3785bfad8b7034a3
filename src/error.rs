use crate::metrics::PromQLSyntaxError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid PromQL query: {0}")]
    QuerySyntax(#[from] PromQLSyntaxError),

    #[error("Request doesn't have access token cookie")]
    MissingAccessToken,

    #[error("malformed access token: {0}")]
    MalformedAccessToken(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A job or app instance referenced by the request does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("Apps client is not configured")]
    AppsClientNotConfigured,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} responded with status {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::QuerySyntax(_)
            | Error::MissingAccessToken
            | Error::MalformedAccessToken(_)
            | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            // an unresolvable reference can never be authorized
            Error::NotFound(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Unexpected error: {}", self);
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}
