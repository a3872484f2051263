// ABOUTME: Shared logging setup for blessclient binaries
// ABOUTME: Logs go to stderr because ssh may own stdin/stdout when we run from ssh_config

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Default level when `--verbose` is not given.
pub const DEFAULT_LEVEL: Level = Level::WARN;

/// Pick the base level for a verbosity flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        DEFAULT_LEVEL
    }
}

/// Build the filter: RUST_LOG directives win, otherwise the verbosity level applies.
pub fn filter_for(verbose: bool) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level_for(verbose).into())
        .from_env_lossy()
}

/// Standard logging to stderr. Default: WARN, DEBUG with `verbose`, RUST_LOG override.
///
/// Never writes to stdout: when invoked from a `ProxyCommand` or `Match exec`
/// block, stdout belongs to the ssh process.
pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter_for(verbose))
        .with_target(verbose)
        .init();
}
