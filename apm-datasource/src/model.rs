use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod table;

pub use table::{ResultTable, SeriesColumn, SeriesFrame, TIMESTAMP_COLUMN};

/// Separator joining device identifiers, tag suffixes and parameter names into series keys.
pub const PATH_SEPARATOR: char = '\\';

/// Separator used by APM between the qualifying segments of device and tag identifiers.
pub const APM_SEGMENT_SEPARATOR: char = '@';

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Last `@` segment of a fully qualified APM identifier.
pub fn last_segment(qualified: &str) -> &str {
    qualified.rsplit(APM_SEGMENT_SEPARATOR).next().unwrap_or(qualified)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for MachineId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for MachineId {
    fn from(rep: String) -> Self {
        Self(rep)
    }
}

impl From<&str> for MachineId {
    fn from(rep: &str) -> Self {
        Self(rep.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for GroupId {
    fn from(rep: &str) -> Self {
        Self(rep.to_string())
    }
}

/// Composite `deviceId\tagSuffix` key identifying a value series in the history store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompactPath(String);

impl CompactPath {
    pub fn new(device_id: &str, tag_suffix: &str) -> Self {
        Self(format!("{device_id}{PATH_SEPARATOR}{tag_suffix}"))
    }
}

impl fmt::Display for CompactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CompactPath {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// A monitored feature of a device selected by one of the job's parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub parameter: String,
    pub tag_suffix: String,
}

impl TagRef {
    pub fn new(parameter: impl Into<String>, tag_suffix: impl Into<String>) -> Self {
        Self { parameter: parameter.into(), tag_suffix: tag_suffix.into() }
    }
}

/// Normalized topology of one machine: which of the requested parameters it monitors and the
/// history-store keys under which those parameters are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub machine_id: MachineId,
    pub device_id: String,
    pub group_id: GroupId,
    pub tags: Vec<TagRef>,
    pub compact_paths: Vec<CompactPath>,
}

impl DeviceRecord {
    pub fn new(machine_id: MachineId, device_id: impl Into<String>, group_id: GroupId, tags: Vec<TagRef>) -> Self {
        let device_id = device_id.into();
        let compact_paths = tags
            .iter()
            .map(|tag| CompactPath::new(device_id.as_str(), tag.tag_suffix.as_str()))
            .collect();

        Self { machine_id, device_id, group_id, tags, compact_paths }
    }

    /// Pairs each compact path with the tag (and so the parameter) it was built from.
    pub fn series(&self) -> impl Iterator<Item = (&TagRef, &CompactPath)> {
        self.tags.iter().zip(self.compact_paths.iter())
    }
}

#[derive(Debug, Error)]
pub enum TimeRangeError {
    #[error("date {value:?} is not formatted as YYYY-MM-DD: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("time range starts at {start} after it ends at {end}")]
    Inverted { start: DateTime<Utc>, end: DateTime<Utc> },
}

/// Inclusive time constraint. Both ends are midnight UTC of the configured dates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeRangeError> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if end < start {
            return Err(TimeRangeError::Inverted { start, end });
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start <= *ts && *ts <= self.end
    }
}

fn parse_date(rep: &str) -> Result<DateTime<Utc>, TimeRangeError> {
    let date = NaiveDate::parse_from_str(rep.trim(), DATE_FORMAT)
        .map_err(|source| TimeRangeError::InvalidDate { value: rep.to_string(), source })?;
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Ok(Utc.from_utc_datetime(&midnight))
}

/// One history-store lookup: a single series of a device over any of the job's time ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPredicate {
    pub group_id: GroupId,
    pub compact_path: CompactPath,
    pub parameter: String,
    pub time_ranges: Vec<TimeRange>,
}

impl QueryPredicate {
    /// Name of the value column produced for this predicate, `compactPath\parameter`.
    pub fn series_name(&self) -> String {
        format!("{}{PATH_SEPARATOR}{}", self.compact_path, self.parameter)
    }

    /// Series name prefixed by the group, `groupId\compactPath\parameter`.
    pub fn qualified_series_name(&self) -> String {
        format!("{}{PATH_SEPARATOR}{}", self.group_id, self.series_name())
    }

    /// Two predicates read the same series when group, compact path and parameter agree.
    pub fn same_series(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.compact_path == other.compact_path
            && self.parameter == other.parameter
    }

    pub fn matches(&self, ts: &DateTime<Utc>) -> bool {
        self.time_ranges.iter().any(|range| range.contains(ts))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Default for SampleValue {
    fn default() -> Self {
        Self::Null
    }
}

impl SampleValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for SampleValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for SampleValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SampleValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SampleValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub ts: DateTime<Utc>,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(ts: DateTime<Utc>, value: impl Into<SampleValue>) -> Self {
        Self { ts, value: value.into() }
    }
}
