use either::{Either, Left};
use thiserror::Error;

use crate::error::{MetricLabel, SharedString};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store call failed: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("history store connection string names no database")]
    MissingDatabase,

    #[error("malformed history document: {0}")]
    MalformedDocument(String),
}

impl MetricLabel for HistoryError {
    fn slug(&self) -> SharedString {
        "history".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Mongo(_) => Left("mongo".into()),
            Self::MissingDatabase => Left("database".into()),
            Self::MalformedDocument(_) => Left("document".into()),
        }
    }
}
