//! Log subscriber setup for the command-line binary.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "genbatch=info";
const VERBOSE_FILTER: &str = "genbatch=debug";

/// Installs a stderr fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks debug or info for this
/// crate. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
