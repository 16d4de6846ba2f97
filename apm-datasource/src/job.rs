use std::sync::Arc;

use serde::Serialize;

use crate::apm::ApmContext;
use crate::configuration::JobConfiguration;
use crate::error::DataSourceError;
use crate::history::{HistoryStore, MongoHistoryStore};
use crate::model::{QueryPredicate, ResultTable};
use crate::phases::{self, MachineResolution, MachineStatus};
use crate::settings::Settings;

/// What happened during one job, reported alongside the result table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub machines: Vec<MachineStatus>,
    pub nr_predicates: usize,
    pub empty_series: Vec<String>,
    pub merged_series: Vec<String>,
}

impl JobSummary {
    pub fn nr_skipped_machines(&self) -> usize {
        self.machines
            .iter()
            .filter(|m| matches!(m, MachineStatus::Skipped { .. }))
            .count()
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub table: ResultTable,
    pub summary: JobSummary,
}

/// What the stages of one `execute_query` call produced, folded into the job summary.
#[derive(Debug, Default)]
struct JobContext {
    resolutions: Vec<MachineResolution>,
    predicates: Vec<QueryPredicate>,
    empty_series: Vec<String>,
}

impl JobContext {
    fn into_summary(self, table: &ResultTable) -> JobSummary {
        JobSummary {
            machines: self.resolutions.iter().map(MachineStatus::from).collect(),
            nr_predicates: self.predicates.len(),
            empty_series: self.empty_series,
            merged_series: table.columns().iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// Read-only data source over APM topology and machine history.
#[derive(Debug)]
pub struct ApmDataSource {
    configuration: JobConfiguration,
    settings: Settings,
    apm: ApmContext,
    store: Option<Arc<dyn HistoryStore>>,
}

impl ApmDataSource {
    pub fn new(configuration: JobConfiguration, settings: Settings) -> Result<Self, DataSourceError> {
        let apm = ApmContext::from_settings(configuration.apm_url.clone(), &settings.apm)?;
        Ok(Self { configuration, settings, apm, store: None })
    }

    pub fn with_store(self, store: Arc<dyn HistoryStore>) -> Self {
        Self { store: Some(store), ..self }
    }

    pub const fn configuration(&self) -> &JobConfiguration {
        &self.configuration
    }

    pub const fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Opens the history store named by the job's connection string unless a store is already held.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn connect(&mut self) -> Result<(), DataSourceError> {
        if self.store.is_none() {
            let store =
                MongoHistoryStore::connect(self.configuration.store_uri(), &self.settings.history).await?;
            self.store = Some(Arc::new(store));
        }
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub fn disconnect(&mut self) {
        if self.store.take().is_some() {
            tracing::info!("released history store");
        }
    }

    /// Validates the query, resolves machine topology, then reads and merges the planned series.
    /// Connects to the history store first if needed.
    #[tracing::instrument(level = "info", skip(self), fields(nr_machines=%self.configuration.machine_ids.len()))]
    pub async fn execute_query(&mut self) -> Result<JobOutcome, DataSourceError> {
        self.configuration.check_query(&self.settings.merge)?;
        self.connect().await?;
        let store = match self.store.as_ref() {
            Some(store) => Arc::clone(store),
            None => return Err(DataSourceError::validation("history store is not connected")),
        };

        let mut context = JobContext::default();

        context.resolutions = phases::resolve_devices(
            &self.apm,
            &self.configuration.credentials,
            &self.configuration.machine_ids,
            &self.configuration.parameters,
        )
        .await?;

        let devices: Vec<_> = context
            .resolutions
            .iter()
            .filter_map(MachineResolution::device)
            .cloned()
            .collect();
        context.predicates = phases::plan_queries(&devices, &self.configuration.time_ranges)?;

        let execution = phases::execute(
            store.as_ref(),
            self.settings.history.collection.as_str(),
            &context.predicates,
        )
        .await?;
        context.empty_series = execution.empty_series;

        let table = phases::merge(execution.frames, &self.settings.merge)?;
        let summary = context.into_summary(&table);
        tracing::info!(?summary, nr_rows=%table.nr_rows(), "APM data source query completed");
        Ok(JobOutcome { table, summary })
    }

    pub fn is_table_exist(&self, _table: &str) -> Result<bool, DataSourceError> {
        Err(DataSourceError::unsupported("is_table_exist"))
    }

    pub fn is_file_exist(&self, _table: &str, _file: &str) -> Result<bool, DataSourceError> {
        Err(DataSourceError::unsupported("is_file_exist"))
    }

    pub fn create_table(&self, _table: &str) -> Result<(), DataSourceError> {
        Err(DataSourceError::unsupported("create_table"))
    }

    pub fn insert(
        &self, _table: &str, _columns: &[String], _records: &[Vec<serde_json::Value>],
    ) -> Result<(), DataSourceError> {
        Err(DataSourceError::unsupported("insert"))
    }
}
