use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::metrics::{
    METRIC_EXPORT_RENDER_MS, METRIC_EXPORTS_COMPLETED, METRIC_EXPORTS_FAILED,
    METRIC_EXPORTS_RECONCILED, METRIC_EXPORTS_SUBMITTED,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_EXPORTS_SUBMITTED,
            Unit::Count,
            "Export jobs accepted and handed to the queue."
        );
        describe_counter!(
            METRIC_EXPORTS_COMPLETED,
            Unit::Count,
            "Export jobs that produced a stored artifact."
        );
        describe_counter!(
            METRIC_EXPORTS_FAILED,
            Unit::Count,
            "Export jobs recorded as failed, labelled by reason."
        );
        describe_histogram!(
            METRIC_EXPORT_RENDER_MS,
            Unit::Milliseconds,
            "Time spent rendering one export in milliseconds."
        );
        describe_counter!(
            METRIC_EXPORTS_RECONCILED,
            Unit::Count,
            "Exports failed by the stale-processing sweep."
        );
    });
}
