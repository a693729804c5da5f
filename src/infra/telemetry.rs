use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Fails, without panicking, if a global subscriber is already installed.
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
            "kettle_store_hit_total",
            Unit::Count,
            "Total number of cache store hits."
        );
        describe_counter!(
            "kettle_store_miss_total",
            Unit::Count,
            "Total number of cache store misses."
        );
        describe_counter!(
            "kettle_store_evict_total",
            Unit::Count,
            "Total number of cache store evictions due to capacity."
        );
        describe_gauge!(
            "kettle_event_queue_len",
            Unit::Count,
            "Current number of pending change events in the queue."
        );
        describe_counter!(
            "kettle_event_coalesced_total",
            Unit::Count,
            "Total number of change events folded into a pending event for the same entity."
        );
        describe_counter!(
            "kettle_rebuild_total",
            Unit::Count,
            "Total number of rebuild attempts, labelled by outcome."
        );
        describe_histogram!(
            "kettle_consume_ms",
            Unit::Milliseconds,
            "Change consumption latency in milliseconds."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn second_init_errors_instead_of_panicking() {
        let logging = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        };

        // The first call may already lose to another test's subscriber.
        let _ = init(&logging);
        assert!(matches!(init(&logging), Err(InfraError::Telemetry(_))));
    }
}
