use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan, time::ChronoUtc},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

const DEFAULT_FILTER: &str = "info,review_pipeline=debug";

/// Installs the global subscriber: `RUST_LOG` (or the default filter), one
/// compact line per event, RFC3339 UTC timestamps, span-close timings.
pub fn init_tracing() -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_timer(ChronoUtc::rfc_3339())
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init()
}
