use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV_VAR: &str = "BARCODE_OVERLAY_LOG";

pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_filter))
}

// False when a global subscriber was already set.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_target(true).with_ansi(false))
        .try_init()
        .is_ok()
}
