use either::{Either, Left, Right};
use thiserror::Error;

use crate::error::{MetricLabel, SharedString};

#[derive(Debug, Error)]
pub enum ApmError {
    #[error("invalid APM url: {0}")]
    Url(#[from] url::ParseError),

    #[error("supplied APM url cannot be a base to query: {0}")]
    NotABaseUrl(url::Url),

    #[error("APM REST API call failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidRequestHeaderDetail(#[source] anyhow::Error),

    #[error("failed processing JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("APM {endpoint} responded with unexpected status: {status}")]
    UnexpectedStatus { endpoint: String, status: reqwest::StatusCode },
}

impl MetricLabel for ApmError {
    fn slug(&self) -> SharedString {
        "apm".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Url(_) => Left("http::url".into()),
            Self::NotABaseUrl(_) => Left("http::url::NotABaseUrl".into()),
            Self::HttpRequest(err) if err.is_timeout() => Left("http::timeout".into()),
            Self::HttpRequest(_) => Left("http::request".into()),
            Self::InvalidRequestHeaderDetail(_) => Left("http::header".into()),
            Self::Json(_) => Left("http::json".into()),
            Self::UnexpectedStatus { .. } => Left("http::status".into()),
        }
    }
}

/// Login did not produce an access token within the allowed attempts.
#[derive(Debug, Error)]
#[error("APM login failed after {attempts} attempt(s): {cause}")]
pub struct AuthenticationError {
    pub attempts: u32,
    #[source]
    pub cause: ApmError,
}

impl MetricLabel for AuthenticationError {
    fn slug(&self) -> SharedString {
        "authentication".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        Right(Box::new(&self.cause))
    }
}
