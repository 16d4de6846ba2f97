use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::DataSourceError;
use crate::model::{ResultTable, SampleValue, SeriesFrame};
use crate::settings::{MergeSettings, SeedFallback};

/// Left outer joins every frame onto the seed frame by equal timestamp.
///
/// The seed is the first frame named with the timestamp marker. Its distinct timestamps, in seed
/// order, are the table rows. Columns follow the seed in execution order, and a frame repeating a
/// timestamp contributes its first sample at that timestamp.
#[tracing::instrument(level = "info", skip(frames, settings), fields(nr_frames=%frames.len()))]
pub fn merge(frames: Vec<SeriesFrame>, settings: &MergeSettings) -> Result<ResultTable, DataSourceError> {
    if frames.is_empty() {
        tracing::warn!("no history series to merge - result table is empty");
        return Ok(ResultTable::empty());
    }

    check_distinct_names(&frames)?;
    let seed_pos = select_seed(&frames, settings)?;
    let mut frames = frames;
    let seed = frames.remove(seed_pos);

    let mut seen = HashSet::with_capacity(seed.len());
    let mut timestamps = Vec::with_capacity(seed.len());
    let mut seed_values = Vec::with_capacity(seed.len());
    for sample in seed.samples {
        if seen.insert(sample.ts) {
            timestamps.push(sample.ts);
            seed_values.push(sample.value);
        }
    }

    let mut table = ResultTable::new(timestamps);
    table.push_column(seed.name, seed_values);

    for frame in frames {
        let values = align(table.timestamps(), &frame);
        table.push_column(frame.name, values);
    }

    tracing::info!(nr_rows=%table.nr_rows(), columns=?table.column_names(), "merged history series");
    Ok(table)
}

fn check_distinct_names(frames: &[SeriesFrame]) -> Result<(), DataSourceError> {
    let mut names = HashSet::with_capacity(frames.len());
    match frames.iter().map(|f| f.name.as_str()).find(|name| !names.insert(*name)) {
        Some(duplicate) => Err(DataSourceError::validation(format!(
            "more than one retrieved series is named {duplicate:?}"
        ))),
        None => Ok(()),
    }
}

fn select_seed(frames: &[SeriesFrame], settings: &MergeSettings) -> Result<usize, DataSourceError> {
    if let Some(pos) = frames.iter().position(|f| settings.is_timestamp_marker(f.name.as_str())) {
        return Ok(pos);
    }

    match settings.seed_fallback {
        SeedFallback::FirstFrame => {
            tracing::warn!(
                seed=%frames[0].name, marker=%settings.timestamp_marker,
                "no series carries the timestamp marker - seeding merge with first series"
            );
            Ok(0)
        },
        SeedFallback::Fail => Err(DataSourceError::validation(format!(
            "no retrieved series carries the timestamp marker {:?}",
            settings.timestamp_marker
        ))),
    }
}

fn align(timestamps: &[DateTime<Utc>], frame: &SeriesFrame) -> Vec<SampleValue> {
    let mut by_ts: HashMap<&DateTime<Utc>, &SampleValue> = HashMap::with_capacity(frame.len());
    for sample in frame.samples.iter() {
        by_ts.entry(&sample.ts).or_insert(&sample.value);
    }

    timestamps
        .iter()
        .map(|ts| by_ts.get(ts).map_or(SampleValue::Null, |v| (*v).clone()))
        .collect()
}
