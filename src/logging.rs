use log::{info, log_enabled, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// The library itself only emits through the `log` facade; binaries decide
/// where records go. Verbosity follows `RUST_LOG`.
pub fn init_logger() {
    env_logger::init();
}

/// Initializes the logger with a default filter used when `RUST_LOG` is unset.
pub fn init_logger_with_default(filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}
