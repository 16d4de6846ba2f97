use crate::configuration::{self, TimeRangeSpec};
use crate::error::DataSourceError;
use crate::model::{DeviceRecord, QueryPredicate, TimeRange};

/// Parses the time ranges, failing before any predicate is built, then plans one predicate per
/// device series.
#[tracing::instrument(level = "info", skip(devices))]
pub fn plan_queries(devices: &[DeviceRecord], time_ranges: &[TimeRangeSpec]) -> Result<Vec<QueryPredicate>, DataSourceError> {
    let ranges = configuration::parse_time_ranges(time_ranges)?;
    let predicates = plan_with_ranges(devices, &ranges);
    tracing::info!(nr_devices=%devices.len(), nr_predicates=%predicates.len(), "planned history queries");
    Ok(predicates)
}

/// Cross product of device series with already parsed ranges, grouped by device in the given order.
/// A series planned more than once, e.g. for a repeated machine id, keeps its first predicate.
pub fn plan_with_ranges(devices: &[DeviceRecord], ranges: &[TimeRange]) -> Vec<QueryPredicate> {
    let candidates = devices.iter().flat_map(|device| {
        device.series().map(move |(tag, compact_path)| QueryPredicate {
            group_id: device.group_id.clone(),
            compact_path: compact_path.clone(),
            parameter: tag.parameter.clone(),
            time_ranges: ranges.to_vec(),
        })
    });

    let mut predicates: Vec<QueryPredicate> = Vec::new();
    for candidate in candidates {
        if predicates.iter().any(|p| p.same_series(&candidate)) {
            tracing::warn!(
                series=%candidate.qualified_series_name(),
                "series planned more than once - dropping repeated query"
            );
        } else {
            predicates.push(candidate);
        }
    }
    predicates
}
