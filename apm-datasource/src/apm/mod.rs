mod api_model;
mod context;
mod error;

pub use api_model::{DtFeature, DtInstance, DtProperty, IotSense, MonitoredFeature, NodeDetail};
pub use context::{AccessToken, ApmContext};
pub use error::{ApmError, AuthenticationError};
use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts};

use crate::error::MetricLabel;

pub(crate) const LOGIN: &str = "login";
pub(crate) const NODE_DETAIL: &str = "node_detail";

#[allow(clippy::cognitive_complexity)]
pub(crate) fn log_response(label: &str, response: &reqwest::Response) {
    const PREAMBLE: &str = "APM response received";
    let status = response.status();
    if status.is_success() || status.is_informational() {
        tracing::debug!(?response, "{PREAMBLE}: {label}");
    } else {
        tracing::warn!(?response, "{PREAMBLE}: {label}");
    }
}

pub static APM_API_TIME: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("apm_api_time", "Time spent calling the APM API in seconds")
            .buckets(vec![0.1, 0.15, 0.2, 0.3, 0.4, 0.5, 1.0, 2.5, 5.0, 7.5, 10.0]),
        &["action"],
    )
    .expect("failed creating apm_api_time metric")
});

#[inline]
pub(crate) fn start_apm_timer(action: &str) -> HistogramTimer {
    APM_API_TIME.with_label_values(&[action]).start_timer()
}

pub static APM_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("apm_errors", "Number of errors calling the APM API"),
        &["action", "error_type"],
    )
    .expect("failed creating apm_errors metric")
});

#[inline]
pub(crate) fn track_apm_errors<E: MetricLabel>(action: &str, error: &E) {
    APM_ERRORS.with_label_values(&[action, error.label().as_ref()]).inc()
}
