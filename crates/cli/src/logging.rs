use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::error::{Error, Result};

/// Install a stderr subscriber so stdout carries only the conversation.
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `info` with `-v`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| Error::Logging(e.to_string()))
}
