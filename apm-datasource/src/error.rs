use std::borrow::Cow;

use either::{Either, Left, Right};
use thiserror::Error;

use crate::apm::{ApmError, AuthenticationError};
use crate::configuration::ConfigurationError;
use crate::history::HistoryError;

pub type SharedString = Cow<'static, str>;

/// Renders an error into a `::` separated label suitable for a prometheus label value. Each level
/// names itself via `slug` and either terminates with a leaf label or delegates to a nested error.
pub trait MetricLabel {
    fn slug(&self) -> SharedString;

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>>;

    fn label(&self) -> SharedString {
        match self.next() {
            Left(leaf) => format!("{}::{}", self.slug(), leaf).into(),
            Right(nested) => format!("{}::{}", self.slug(), nested.label()).into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    #[error("invalid query: {0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(#[from] AuthenticationError),

    #[error("APM client failure: {0}")]
    Apm(#[from] ApmError),

    #[error("history store failure: {0}")]
    History(#[from] HistoryError),

    #[error("{operation} is not supported by the APM data source")]
    Unsupported { operation: &'static str },
}

impl DataSourceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}

impl MetricLabel for DataSourceError {
    fn slug(&self) -> SharedString {
        "datasource".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Configuration(_) => Left("configuration".into()),
            Self::Validation(_) => Left("validation".into()),
            Self::Authentication(err) => Right(Box::new(err)),
            Self::Apm(err) => Right(Box::new(err)),
            Self::History(err) => Right(Box::new(err)),
            Self::Unsupported { .. } => Left("unsupported".into()),
        }
    }
}
