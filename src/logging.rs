//! Tracing subscriber wiring for the daemon.

// crates.io
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the defaults, dev
/// mode lowers the crate's level to debug.
pub fn init(dev: bool) {
	let fallback = if dev { "info,pingr=debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

	// A second init (e.g. from tests) keeps the first subscriber.
	let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
