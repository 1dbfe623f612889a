//! Logging setup for the binaries

use tracing::Level;

/// Level used for a given verbosity flag
pub fn level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install the fmt subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level(verbose))
        .with_target(false)
        .try_init();
}
