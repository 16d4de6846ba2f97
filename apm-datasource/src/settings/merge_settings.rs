use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// What the merger does when no series carries the timestamp marker.
#[derive(Debug, Display, EnumString, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SeedFallback {
    /// The first series in execution order becomes the seed.
    FirstFrame,
    /// The job fails with a validation error.
    Fail,
}

impl Default for SeedFallback {
    fn default() -> Self {
        Self::FirstFrame
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub timestamp_marker: String,
    pub excluded_marker: String,
    pub require_timestamp_marker: bool,
    pub seed_fallback: SeedFallback,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            timestamp_marker: Self::DEFAULT_TIMESTAMP_MARKER.to_string(),
            excluded_marker: Self::DEFAULT_EXCLUDED_MARKER.to_string(),
            require_timestamp_marker: true,
            seed_fallback: SeedFallback::default(),
        }
    }
}

impl MergeSettings {
    const DEFAULT_EXCLUDED_MARKER: &'static str = "Time_Stamp_ms";
    const DEFAULT_TIMESTAMP_MARKER: &'static str = "Time_Stamp";

    /// Case-sensitive: the name contains the timestamp marker but not the excluded marker.
    pub fn is_timestamp_marker(&self, name: &str) -> bool {
        name.contains(self.timestamp_marker.as_str()) && !name.contains(self.excluded_marker.as_str())
    }
}
