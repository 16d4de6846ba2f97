use once_cell::sync::Lazy;
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

pub const APP_NAME: &str = "apm-datasource";

/// Set to any value to see test logs; otherwise test logs are discarded.
pub const TEST_LOG_ENV: &str = "TEST_LOG";

/// Bunyan JSON subscriber filtered by `RUST_LOG`, falling back to `log_directives`.
pub fn get_tracing_subscriber<W>(
    name: impl Into<String>, log_directives: impl AsRef<str>, sink: W,
) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directives.as_ref()));
    let bunyan_formatting = BunyanFormattingLayer::new(name.into(), sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(bunyan_formatting)
}

/// Installs the subscriber process-wide. Can only be called once.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {err}");
    }
}

pub static TEST_TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "debug";
    let subscriber_name = "test";
    if std::env::var(TEST_LOG_ENV).is_ok() {
        let subscriber = get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    };
});
