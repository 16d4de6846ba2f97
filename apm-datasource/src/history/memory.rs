use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{HistoryError, HistoryStore};
use crate::model::{QueryPredicate, Sample};

/// Test double for the history store: history held in memory, keyed by `(groupId, compactPath)`.
/// Records every predicate it answers and can be told to fail. The binary always reads from
/// MongoDB.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    series: HashMap<(String, String), Vec<Sample>>,
    failing: Option<String>,
    queried: Mutex<Vec<QueryPredicate>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, group_id: &str, compact_path: &str, samples: Vec<Sample>) -> Self {
        self.series
            .insert((group_id.to_string(), compact_path.to_string()), samples);
        self
    }

    /// Failure injection: queries of this compact path fail as if the stored document were
    /// unreadable.
    pub fn failing_on(mut self, compact_path: &str) -> Self {
        self.failing = Some(compact_path.to_string());
        self
    }

    pub fn queried(&self) -> Vec<QueryPredicate> {
        self.queried.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    #[tracing::instrument(level = "debug", skip(self, predicate), fields(compact_path=%predicate.compact_path))]
    async fn find(&self, collection: &str, predicate: &QueryPredicate) -> Result<Vec<Sample>, HistoryError> {
        if let Ok(mut queried) = self.queried.lock() {
            queried.push(predicate.clone());
        }

        if self.failing.as_deref() == Some(predicate.compact_path.as_ref()) {
            let error = HistoryError::MalformedDocument(format!("unreadable document for {}", predicate.compact_path));
            super::track_history_errors(super::FIND, &error);
            return Err(error);
        }

        let key = (
            predicate.group_id.as_ref().to_string(),
            predicate.compact_path.as_ref().to_string(),
        );

        let mut samples: Vec<Sample> = self
            .series
            .get(&key)
            .map(|samples| samples.iter().filter(|s| predicate.matches(&s.ts)).cloned().collect())
            .unwrap_or_default();
        samples.sort_by_key(|s| s.ts);
        Ok(samples)
    }
}
