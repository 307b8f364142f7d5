//! Subscriber setup for the binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter`; a malformed default falls back to
/// `info`. Returns false when a subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match EnvFilter::try_new(default_filter) {
            Ok(filter) => filter,
            Err(error) => {
                eprintln!("ignoring log filter {default_filter:?}: {error}");
                EnvFilter::new("info")
            }
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
