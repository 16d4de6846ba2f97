use std::future::Future;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use apm_datasource::configuration::JobConfiguration;
use apm_datasource::job::{ApmDataSource, JobOutcome};
use apm_datasource::logging::{self, APP_NAME};
use apm_datasource::settings::{CliOptions, OutputFormat, Settings};
use apm_datasource::{metrics, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use prometheus::Registry;

static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("apm_datasource".to_string()), None).expect("failed to create prometheus registry")
});

fn main() -> Result<()> {
    let subscriber = logging::get_tracing_subscriber(APP_NAME, "info", std::io::stderr);
    logging::init_subscriber(subscriber);

    let main_span = tracing::trace_span!("main");
    let _main_span_guard = main_span.enter();

    let options = CliOptions::parse();
    let settings = Settings::load(&options)?;
    let configuration = load_job_configuration(options.job.as_deref())?;
    metrics::register_metrics(&METRICS_REGISTRY)?;

    let outcome = start_job(async move {
        let mut source = ApmDataSource::new(configuration, settings)?;
        let outcome = source.execute_query().await;
        source.disconnect();
        Ok(outcome?)
    });

    match metrics::render_metrics(&METRICS_REGISTRY) {
        Ok(exposition) => tracing::debug!(%exposition, "job metrics"),
        Err(error) => tracing::warn!(?error, "failed to render job metrics"),
    }

    let outcome = outcome?;
    tracing::info!(
        summary=?outcome.summary, nr_skipped_machines=%outcome.summary.nr_skipped_machines(),
        "APM data source job finished"
    );
    write_table(&outcome, options.format, options.output.as_deref())
}

fn load_job_configuration(job: Option<&Path>) -> Result<JobConfiguration> {
    let configuration = match job {
        Some(path) => {
            let doc = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read job configuration file {}", path.display()))?;
            JobConfiguration::from_json_str(doc.as_str())?
        },
        None => JobConfiguration::from_env()?,
    };

    tracing::info!(?configuration, "loaded job configuration");
    Ok(configuration)
}

fn start_job<F>(future: F) -> Result<JobOutcome>
where
    F: Future<Output = Result<JobOutcome>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(future)
}

fn write_table(outcome: &JobOutcome, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&outcome.table)?,
        OutputFormat::Ron => ron::ser::to_string_pretty(&outcome.table, ron::ser::PrettyConfig::default())?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("failed to write result table to {}", path.display()))?;
            tracing::info!(output=%path.display(), nr_rows=%outcome.table.nr_rows(), "result table written");
        },
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{rendered}")?;
            stdout.flush()?;
        },
    }

    Ok(())
}
