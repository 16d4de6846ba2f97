use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::apm::ApmError;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApmSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,

    #[serde(rename = "login_timeout_secs", default = "ApmSettings::default_login_timeout")]
    #[serde_as(as = "DurationSeconds")]
    pub login_timeout: Duration,

    #[serde(default = "ApmSettings::default_max_login_attempts")]
    pub max_login_attempts: u32,

    #[serde(default, rename = "request_timeout_secs", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<DurationSeconds>")]
    pub request_timeout: Option<Duration>,

    #[serde(default, rename = "pool_idle_timeout_secs", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<DurationSeconds>")]
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per host. Zero keeps every request on its own connection.
    #[serde(default)]
    pub pool_max_idle_per_host: usize,
}

impl Default for ApmSettings {
    fn default() -> Self {
        Self {
            headers: Vec::default(),
            login_timeout: Self::default_login_timeout(),
            max_login_attempts: Self::DEFAULT_MAX_LOGIN_ATTEMPTS,
            request_timeout: None,
            pool_idle_timeout: None,
            pool_max_idle_per_host: 0,
        }
    }
}

impl ApmSettings {
    const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 3;
    const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;

    pub const fn default_login_timeout() -> Duration {
        Duration::from_secs(Self::DEFAULT_LOGIN_TIMEOUT_SECS)
    }

    pub const fn default_max_login_attempts() -> u32 {
        Self::DEFAULT_MAX_LOGIN_ATTEMPTS
    }

    pub fn header_map(&self) -> Result<HeaderMap, ApmError> {
        let mut result = HeaderMap::with_capacity(self.headers.len());

        for (k, v) in self.headers.iter() {
            let name = HeaderName::from_str(k.as_str()).map_err(|err| ApmError::InvalidRequestHeaderDetail(err.into()))?;
            let value =
                HeaderValue::from_str(v.as_str()).map_err(|err| ApmError::InvalidRequestHeaderDetail(err.into()))?;
            result.insert(name, value);
        }

        Ok(result)
    }
}
