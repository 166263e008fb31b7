use tracing_subscriber::EnvFilter;

/// Installs the log subscriber for the binary.
///
/// `log` records from the library are bridged through tracing-log.
/// Log level is Debug in development builds and Info in production builds,
/// unless `RUST_LOG` says otherwise.
pub fn init() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
