use std::fmt;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::DataSourceError;
use crate::model::{MachineId, TimeRange};
use crate::settings::MergeSettings;

/// Environment variable carrying the job configuration JSON document.
pub const JOB_CONFIGURATION_ENV: &str = "PAI_DATA_DIR";

const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const APM_URL: &str = "apmUrl";
const MACHINE_ID_LIST: &str = "machineIdList";
const PARAMETER_LIST: &str = "parameterList";
const STORE_URI: &str = "credentials.uri";
const TIME_RANGE: &str = "timeRange";

const REQUIRED_FIELDS: [&str; 7] = [
    USERNAME,
    PASSWORD,
    APM_URL,
    MACHINE_ID_LIST,
    PARAMETER_LIST,
    STORE_URI,
    TIME_RANGE,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job configuration - missing fields: {missing:?}, malformed fields: {malformed:?}")]
pub struct ConfigurationError {
    pub missing: Vec<String>,
    pub malformed: Vec<String>,
}

impl ConfigurationError {
    fn all_missing(malformed: Vec<String>) -> Self {
        Self {
            missing: REQUIRED_FIELDS.iter().map(|f| qualify(f)).collect(),
            malformed,
        }
    }
}

fn qualify(field: &str) -> String {
    format!("data.{field}")
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeSpec {
    pub start: String,
    pub end: String,
}

impl TimeRangeSpec {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self { start: start.into(), end: end.into() }
    }
}

/// The parameters of one data retrieval job. Built once, either completely or not at all.
#[derive(Clone)]
pub struct JobConfiguration {
    pub credentials: Credentials,
    pub apm_url: Url,
    pub machine_ids: Vec<MachineId>,
    pub parameters: Vec<String>,
    store_uri: SecretString,
    pub time_ranges: Vec<TimeRangeSpec>,
}

impl fmt::Debug for JobConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfiguration")
            .field("credentials", &self.credentials)
            .field("apm_url", &self.apm_url)
            .field("machine_ids", &self.machine_ids)
            .field("parameters", &self.parameters)
            .field("store_uri", &"[REDACTED]")
            .field("time_ranges", &self.time_ranges)
            .finish()
    }
}

impl JobConfiguration {
    pub fn new(
        credentials: Credentials, apm_url: Url, machine_ids: Vec<MachineId>, parameters: Vec<String>,
        store_uri: impl Into<String>, time_ranges: Vec<TimeRangeSpec>,
    ) -> Self {
        Self {
            credentials,
            apm_url,
            machine_ids,
            parameters,
            store_uri: SecretString::new(store_uri.into()),
            time_ranges,
        }
    }

    pub fn store_uri(&self) -> &SecretString {
        &self.store_uri
    }

    /// Reads the job configuration document from the `PAI_DATA_DIR` environment variable.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_env_var(JOB_CONFIGURATION_ENV)
    }

    #[tracing::instrument(level = "debug")]
    pub fn from_env_var(name: &str) -> Result<Self, ConfigurationError> {
        match std::env::var(name) {
            Ok(doc) => Self::from_json_str(doc.as_str()),
            Err(std::env::VarError::NotPresent) => {
                tracing::error!(env_var=%name, "job configuration environment variable not set");
                Err(ConfigurationError::all_missing(Vec::default()))
            },
            Err(err) => {
                tracing::error!(error=?err, env_var=%name, "unreadable job configuration environment variable");
                Err(ConfigurationError::all_missing(vec![name.to_string()]))
            },
        }
    }

    pub fn from_json_str(doc: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(doc).map_err(|err| {
            tracing::error!(error=?err, "job configuration is not a JSON document");
            ConfigurationError::all_missing(vec!["data".to_string()])
        })?;

        // the environment transport may encode the document as a JSON string
        match value {
            Value::String(inner) => {
                let inner: Value = serde_json::from_str(inner.as_str()).map_err(|err| {
                    tracing::error!(error=?err, "encoded job configuration is not a JSON document");
                    ConfigurationError::all_missing(vec!["data".to_string()])
                })?;
                Self::from_value(&inner)
            },
            value => Self::from_value(&value),
        }
    }

    pub fn from_value(doc: &Value) -> Result<Self, ConfigurationError> {
        let data = match doc.get("data") {
            Some(data) if data.is_object() => data,
            Some(_) => return Err(ConfigurationError::all_missing(vec!["data".to_string()])),
            None => return Err(ConfigurationError::all_missing(Vec::default())),
        };

        let (builder, mistyped) = JobConfigurationBuilder::from_data(data);
        let invalid = builder.validate().err().unwrap_or_else(ValidationErrors::new);

        let configuration = if mistyped.errors().is_empty() && invalid.errors().is_empty() {
            builder.build()
        } else {
            None
        };

        configuration.ok_or_else(|| {
            let error = ConfigurationError::from_validation(&mistyped, &invalid);
            tracing::error!(?error, "invalid job configuration");
            error
        })
    }

    /// Verifies the query shape before any remote call is made, returning the parsed time ranges.
    pub fn check_query(&self, merge: &MergeSettings) -> Result<Vec<TimeRange>, DataSourceError> {
        if self.machine_ids.is_empty() {
            return Err(DataSourceError::validation("machine_list is empty"));
        }

        if self.parameters.is_empty() {
            return Err(DataSourceError::validation("parameter_list is empty"));
        }

        let ranges = parse_time_ranges(self.time_ranges.as_slice())?;

        if merge.require_timestamp_marker && !self.parameters.iter().any(|p| merge.is_timestamp_marker(p)) {
            return Err(DataSourceError::validation(format!(
                "parameter_list {:?} has no timestamp marker parameter containing {:?}",
                self.parameters, merge.timestamp_marker
            )));
        }

        Ok(ranges)
    }
}

pub fn parse_time_ranges(specs: &[TimeRangeSpec]) -> Result<Vec<TimeRange>, DataSourceError> {
    if specs.is_empty() {
        return Err(DataSourceError::validation("time_range is empty"));
    }

    specs
        .iter()
        .enumerate()
        .map(|(pos, spec)| {
            TimeRange::parse(spec.start.as_str(), spec.end.as_str())
                .map_err(|err| DataSourceError::validation(format!("time_range[{pos}] is invalid: {err}")))
        })
        .collect()
}

const REQUIRED: &str = "required";
const MISTYPED: &str = "type";
const MALFORMED: &str = "malformed";
const POSITIONS: &str = "positions";
const URI: &str = "uri";

/// Builder field name paired with the document path reported for it.
const FIELD_PATHS: [(&str, &str); 7] = [
    ("username", USERNAME),
    ("password", PASSWORD),
    ("apm_url", APM_URL),
    ("machine_id_list", MACHINE_ID_LIST),
    ("parameter_list", PARAMETER_LIST),
    ("credentials", STORE_URI),
    ("time_range", TIME_RANGE),
];

impl ConfigurationError {
    /// Type mismatches found while reading the document take precedence over validation failures
    /// of the same field.
    fn from_validation(mistyped: &ValidationErrors, invalid: &ValidationErrors) -> Self {
        let mut error = Self { missing: Vec::new(), malformed: Vec::new() };

        for (field, path) in FIELD_PATHS {
            let kind = mistyped.errors().get(field).or_else(|| invalid.errors().get(field));
            match kind {
                None => {},
                Some(ValidationErrorsKind::Field(failures)) => error.classify(path, failures),
                Some(ValidationErrorsKind::Struct(nested)) => match nested.errors().get(URI) {
                    Some(ValidationErrorsKind::Field(failures)) => error.classify(path, failures),
                    _ => error.malformed.push(qualify(path)),
                },
                Some(ValidationErrorsKind::List(_)) => error.malformed.push(qualify(path)),
            }
        }

        error
    }

    fn classify(&mut self, path: &str, failures: &[ValidationError]) {
        if failures.iter().any(|f| f.code == REQUIRED) {
            self.missing.push(qualify(path));
            return;
        }

        let positions: Vec<u64> = failures
            .iter()
            .filter_map(|f| f.params.get(POSITIONS))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_u64)
            .collect();

        if positions.is_empty() {
            self.malformed.push(qualify(path));
        } else {
            self.malformed
                .extend(positions.into_iter().map(|pos| qualify(format!("{path}[{pos}]").as_str())));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
struct StoreCredentials {
    #[validate(required, length(min = 1))]
    uri: Option<String>,
}

/// Job configuration fields as read from the document, before they are checked.
#[derive(Debug, Default, Clone, PartialEq, Validate)]
struct JobConfigurationBuilder {
    #[validate(required, length(min = 1))]
    username: Option<String>,
    #[validate(required, length(min = 1))]
    password: Option<String>,
    #[validate(required, url, custom = "check_base_url")]
    apm_url: Option<String>,
    #[validate(required, custom = "check_machine_ids")]
    machine_id_list: Option<Vec<Value>>,
    #[validate(required, custom = "check_parameters")]
    parameter_list: Option<Vec<Value>>,
    #[validate(required_nested)]
    credentials: Option<StoreCredentials>,
    #[validate(required, custom = "check_time_ranges")]
    time_range: Option<Vec<Value>>,
}

impl JobConfigurationBuilder {
    /// Reads each field on its own so one mistyped field does not hide the others.
    fn from_data(data: &Value) -> (Self, ValidationErrors) {
        let mut mistyped = ValidationErrors::new();
        let builder = Self {
            username: read_field(data, USERNAME, "username", &mut mistyped),
            password: read_field(data, PASSWORD, "password", &mut mistyped),
            apm_url: read_field(data, APM_URL, "apm_url", &mut mistyped),
            machine_id_list: read_field(data, MACHINE_ID_LIST, "machine_id_list", &mut mistyped),
            parameter_list: read_field(data, PARAMETER_LIST, "parameter_list", &mut mistyped),
            credentials: read_field(data, "credentials", "credentials", &mut mistyped),
            time_range: read_field(data, TIME_RANGE, "time_range", &mut mistyped),
        };
        (builder, mistyped)
    }

    fn build(&self) -> Option<JobConfiguration> {
        let apm_url = Url::parse(self.apm_url.as_deref()?).ok()?;
        let machine_ids = self
            .machine_id_list
            .as_ref()?
            .iter()
            .map(machine_id)
            .collect::<Option<Vec<_>>>()?;
        let parameters = self
            .parameter_list
            .as_ref()?
            .iter()
            .map(|p| parameter(p).map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        let time_ranges = self
            .time_range
            .as_ref()?
            .iter()
            .map(time_range_spec)
            .collect::<Option<Vec<_>>>()?;
        let store_uri = self.credentials.as_ref()?.uri.clone()?;

        Some(JobConfiguration::new(
            Credentials::new(self.username.clone()?, self.password.clone()?),
            apm_url,
            machine_ids,
            parameters,
            store_uri,
            time_ranges,
        ))
    }
}

fn read_field<T: DeserializeOwned>(
    data: &Value, key: &str, field: &'static str, mistyped: &mut ValidationErrors,
) -> Option<T> {
    let value = data.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(error=?err, %key, "job configuration field has the wrong type");
            mistyped.add(field, ValidationError::new(MISTYPED));
            None
        },
    }
}

fn machine_id(value: &Value) -> Option<MachineId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(MachineId::new(s.trim())),
        Value::Number(n) => Some(MachineId::new(n.to_string())),
        _ => None,
    }
}

fn parameter(value: &Value) -> Option<&str> {
    value.as_str().filter(|p| !p.trim().is_empty())
}

fn time_range_spec(value: &Value) -> Option<TimeRangeSpec> {
    let start = value.get("start").and_then(Value::as_str)?;
    let end = value.get("end").and_then(Value::as_str)?;
    Some(TimeRangeSpec::new(start, end))
}

fn check_base_url(rep: &str) -> Result<(), ValidationError> {
    match Url::parse(rep) {
        Ok(url) if !url.cannot_be_a_base() => Ok(()),
        _ => Err(ValidationError::new("base_url")),
    }
}

fn check_machine_ids(items: &[Value]) -> Result<(), ValidationError> {
    check_items(items, |item| machine_id(item).is_some())
}

fn check_parameters(items: &[Value]) -> Result<(), ValidationError> {
    check_items(items, |item| parameter(item).is_some())
}

fn check_time_ranges(items: &[Value]) -> Result<(), ValidationError> {
    check_items(items, |item| time_range_spec(item).is_some())
}

fn check_items(items: &[Value], is_valid: impl Fn(&Value) -> bool) -> Result<(), ValidationError> {
    let positions: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| !is_valid(item))
        .map(|(pos, _)| pos)
        .collect();

    if positions.is_empty() {
        Ok(())
    } else {
        let mut error = ValidationError::new(MALFORMED);
        error.add_param(POSITIONS.into(), &positions);
        Err(error)
    }
}
