use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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

/// Register descriptions for every metric the cache engine emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "stashkit_cache_hit_total",
            Unit::Count,
            "Memoized calls served from the platform cache."
        );
        describe_counter!(
            "stashkit_cache_miss_total",
            Unit::Count,
            "Memoized calls that ran the fetcher."
        );
        describe_counter!(
            "stashkit_cache_invalidated_total",
            Unit::Count,
            "Misses caused by a pending tag or path revalidation."
        );
        describe_counter!(
            "stashkit_cache_background_failure_total",
            Unit::Count,
            "Background cache tasks that failed and were discarded."
        );
        describe_counter!(
            "stashkit_revalidate_total",
            Unit::Count,
            "Revalidation triggers, labelled by kind (tag or path)."
        );
        describe_histogram!(
            "stashkit_cache_fetch_ms",
            Unit::Milliseconds,
            "Fetcher latency on cache misses in milliseconds."
        );
    });
}
