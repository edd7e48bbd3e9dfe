use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the JSON subscriber on stdout.
/// The level comes from `RUST_LOG`, falling back to `info`.
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    // `log` records from actix and our LoggerMiddleware go through the same
    // subscriber via tracing-subscriber's default `tracing-log` bridge.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .init();
}
