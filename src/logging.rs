use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `APPSCRAP_LOG`, then `RUST_LOG`, then `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("APPSCRAP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
