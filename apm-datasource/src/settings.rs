use std::path::PathBuf;

use clap::Parser;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

mod apm_settings;
mod history_settings;
mod merge_settings;

pub use apm_settings::*;
pub use history_settings::*;
pub use merge_settings::*;

pub const ENVIRONMENT_ENV: &str = "APP_ENVIRONMENT";
pub const ENV_PREFIX: &str = "APP";
pub const ENV_SEPARATOR: &str = "__";
pub const DEFAULT_RESOURCES_DIR: &str = "./resources";
pub const APPLICATION_CONFIG: &str = "application.ron";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Config(#[from] config::ConfigError),

    #[error("unrecognized application environment: {0}")]
    UnknownEnvironment(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub apm: ApmSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub merge: MergeSettings,
}

impl Settings {
    /// Layers settings sources from lowest to highest precedence: the resources application file,
    /// the environment-specific resources file, an explicit config file, a secrets file, `APP__`
    /// environment variables and finally command line overrides.
    #[tracing::instrument(level = "info")]
    pub fn load(options: &CliOptions) -> Result<Self, SettingsError> {
        let resources = options.resources_path();
        let mut builder = Config::builder().add_source(File::from(resources.join(APPLICATION_CONFIG)).required(false));

        if let Some(environment) = options.environment()? {
            let env_config = resources.join(format!("{environment}.ron"));
            tracing::info!(%environment, ?env_config, "loading environment settings");
            builder = builder.add_source(File::from(env_config).required(false));
        }

        if let Some(config_path) = options.config.clone() {
            builder = builder.add_source(File::from(config_path));
        }

        if let Some(secrets_path) = options.secrets.clone() {
            builder = builder.add_source(File::from(secrets_path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings: Self = options.load_overrides(builder)?.build()?.try_deserialize()?;
        tracing::debug!(?settings, "settings loaded");
        Ok(settings)
    }
}

#[derive(Debug, Display, EnumString, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Local,
    Production,
}

#[derive(Debug, Display, EnumString, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Ron,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Json
    }
}

#[derive(Parser, Clone, Debug, Default, PartialEq, Eq)]
#[clap(author, version, about)]
pub struct CliOptions {
    /// override environment-based configuration file to load.
    /// Default behavior is to load configuration based on `APP_ENVIRONMENT` envvar.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// specify path to secrets configuration file
    #[clap(short, long)]
    pub secrets: Option<PathBuf>,

    #[clap(short, long)]
    pub environment: Option<AppEnvironment>,

    /// Override default location from which to load configuration files. Default directory is
    /// ./resources.
    #[clap(short, long)]
    pub resources: Option<PathBuf>,

    /// Path to the job configuration JSON document. When absent the document is read from the
    /// `PAI_DATA_DIR` environment variable.
    #[clap(short, long)]
    pub job: Option<PathBuf>,

    /// Write the result table to this file instead of stdout.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Result table format: json or ron.
    #[clap(short, long, default_value_t)]
    pub format: OutputFormat,

    /// Override the history store collection to query.
    #[clap(long)]
    pub collection: Option<String>,
}

impl CliOptions {
    pub fn resources_path(&self) -> PathBuf {
        self.resources
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESOURCES_DIR))
    }

    fn environment(&self) -> Result<Option<AppEnvironment>, SettingsError> {
        if self.environment.is_some() {
            return Ok(self.environment);
        }

        match std::env::var(ENVIRONMENT_ENV) {
            Ok(rep) => rep
                .parse()
                .map(Some)
                .map_err(|_| SettingsError::UnknownEnvironment(rep)),
            Err(_) => Ok(None),
        }
    }

    fn load_overrides(
        &self, config: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        let config = match self.collection.as_deref() {
            None => config,
            Some(collection) => config.set_override("history.collection", collection)?,
        };

        Ok(config)
    }
}
