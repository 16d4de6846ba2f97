use std::fmt::Debug;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts};

use crate::error::MetricLabel;
use crate::model::{QueryPredicate, Sample};

mod error;
mod memory;
mod mongo;

pub use error::HistoryError;
pub use memory::MemoryHistoryStore;
pub use mongo::MongoHistoryStore;

/// Read access to recorded machine history.
#[async_trait]
pub trait HistoryStore: Debug + Send + Sync {
    /// Samples of the predicate's series falling in any of its time ranges, ascending by timestamp.
    async fn find(&self, collection: &str, predicate: &QueryPredicate) -> Result<Vec<Sample>, HistoryError>;
}

pub(crate) const FIND: &str = "find";

pub static HISTORY_QUERY_TIME: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "history_query_time",
            "Time spent querying the history store in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["collection"],
    )
    .expect("failed creating history_query_time metric")
});

#[inline]
pub(crate) fn start_history_timer(collection: &str) -> HistogramTimer {
    HISTORY_QUERY_TIME.with_label_values(&[collection]).start_timer()
}

pub static HISTORY_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("history_errors", "Number of errors querying the history store"),
        &["action", "error_type"],
    )
    .expect("failed creating history_errors metric")
});

#[inline]
pub(crate) fn track_history_errors(action: &str, error: &HistoryError) {
    HISTORY_ERRORS.with_label_values(&[action, error.label().as_ref()]).inc()
}
