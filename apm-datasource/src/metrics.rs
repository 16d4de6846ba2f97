use prometheus::{Encoder, Registry, TextEncoder};

use crate::{apm, history, phases, Result};

#[tracing::instrument(level = "trace")]
pub fn register_metrics(registry: &Registry) -> Result<()> {
    registry.register(Box::new(apm::APM_API_TIME.clone()))?;
    registry.register(Box::new(apm::APM_ERRORS.clone()))?;

    registry.register(Box::new(phases::MACHINES_SKIPPED.clone()))?;

    registry.register(Box::new(history::HISTORY_QUERY_TIME.clone()))?;
    registry.register(Box::new(history::HISTORY_ERRORS.clone()))?;
    Ok(())
}

/// Text exposition of everything gathered by the registry.
pub fn render_metrics(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use claims::*;

    use super::*;

    #[test]
    fn test_register_and_render_metrics() {
        let registry = assert_ok!(Registry::new_custom(Some("test".to_string()), None));
        assert_ok!(register_metrics(&registry));

        apm::APM_ERRORS.with_label_values(&["login", "apm::http::status"]).inc();
        let rendered = assert_ok!(render_metrics(&registry));
        assert!(rendered.contains("test_apm_errors"));

        assert_err!(register_metrics(&registry));
    }
}
