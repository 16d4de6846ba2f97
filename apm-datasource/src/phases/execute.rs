use std::collections::{HashMap, HashSet};

use crate::history::{HistoryError, HistoryStore};
use crate::model::{QueryPredicate, SeriesFrame};

/// Frames read for the planned predicates, in predicate order, plus the series that had no data.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Execution {
    pub frames: Vec<SeriesFrame>,
    pub empty_series: Vec<String>,
}

/// Runs each predicate in turn. The first store failure aborts execution.
#[tracing::instrument(level = "info", skip(store, predicates), fields(nr_predicates=%predicates.len()))]
pub async fn execute(
    store: &dyn HistoryStore, collection: &str, predicates: &[QueryPredicate],
) -> Result<Execution, HistoryError> {
    let mut execution = Execution::default();

    for (predicate, name) in predicates.iter().zip(series_names(predicates)) {
        let samples = store.find(collection, predicate).await?;

        if samples.is_empty() {
            tracing::warn!(series=%name, "no history recorded for series in requested time ranges");
            execution.empty_series.push(name);
        } else {
            tracing::debug!(series=%name, nr_samples=%samples.len(), "history series retrieved");
            execution.frames.push(SeriesFrame::new(name, samples));
        }
    }

    Ok(execution)
}

/// Column name for each predicate, `compactPath\\parameter`, prefixed by the group where devices of
/// different groups share that name.
pub fn series_names(predicates: &[QueryPredicate]) -> Vec<String> {
    let mut groups: HashMap<String, HashSet<&str>> = HashMap::with_capacity(predicates.len());
    for predicate in predicates {
        groups
            .entry(predicate.series_name())
            .or_default()
            .insert(predicate.group_id.as_ref());
    }

    predicates
        .iter()
        .map(|predicate| {
            let name = predicate.series_name();
            if groups.get(&name).map_or(false, |g| 1 < g.len()) {
                predicate.qualified_series_name()
            } else {
                name
            }
        })
        .collect()
}
