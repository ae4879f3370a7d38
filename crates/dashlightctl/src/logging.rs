//! Logging setup. Everything goes to stderr so `turn` keeps stdout pure JSON.

use tracing_subscriber::EnvFilter;

/// `--verbose` forces debug; otherwise `RUST_LOG`, else warn.
pub fn filter(verbose: bool, env: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    env.and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

pub fn init(verbose: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, env.as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
