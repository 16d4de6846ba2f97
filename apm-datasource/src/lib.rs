#![forbid(unsafe_code)]
#![warn(
    clippy::cargo,
    clippy::suspicious,
    // missing_docs,
    clippy::nursery,
    rust_2018_idioms
)]

pub mod apm;
pub mod configuration;
pub mod error;
pub mod history;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod phases;
pub mod settings;

pub use error::DataSourceError;

pub type Result<T> = anyhow::Result<T>;
