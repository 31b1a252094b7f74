use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "MEDIAMUX_LOG";
const DEFAULT_FILTER: &str = "mediamux_engine=info";

/// Installs a stderr fmt subscriber. `MEDIAMUX_LOG` wins over `RUST_LOG`,
/// which wins over `default_filter`. Calling it twice is harmless.
pub fn init(default_filter: Option<&str>) {
    let filter = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
