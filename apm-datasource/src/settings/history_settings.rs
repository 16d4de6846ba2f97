use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Collection holding raw historical readings.
    #[serde(default = "HistorySettings::default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(default, rename = "connect_timeout_secs", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<DurationSeconds>")]
    pub connect_timeout: Option<Duration>,

    #[serde(default, rename = "server_selection_timeout_secs", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<DurationSeconds>")]
    pub server_selection_timeout: Option<Duration>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            collection: Self::default_collection(),
            app_name: None,
            connect_timeout: None,
            server_selection_timeout: None,
        }
    }
}

impl HistorySettings {
    const DEFAULT_COLLECTION: &'static str = "scada_HistRawData";

    pub fn default_collection() -> String {
        Self::DEFAULT_COLLECTION.to_string()
    }
}
