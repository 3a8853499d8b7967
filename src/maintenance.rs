//! Disk-space maintainer: trims the oldest log rows when free space on the
//! data directory's filesystem drops below the configured floor.
//!
//! A best-effort guardrail, not a retention policy.

// crates.io
use tokio::time;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, config::ConfigHandle, store::Store};

/// Interval between free-space checks.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Log rows removed per trim.
pub const TRIM_BATCH: u32 = 100_000;

const GIB: u64 = 1 << 30;

/// Run the hourly sweep until shutdown.
pub async fn run(store: Store, config: ConfigHandle, shutdown: CancellationToken) {
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = time::sleep(SWEEP_INTERVAL) => {},
		}

		if let Err(err) = sweep(&store, &config).await {
			tracing::warn!(error = %err, "disk maintenance sweep failed");
		}
	}
}

/// One free-space check; trims when below the floor.
pub async fn sweep(store: &Store, config: &ConfigHandle) -> Result<()> {
	let snapshot = config.snapshot();
	let directory = match snapshot.sqlite_path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => std::path::PathBuf::from("."),
	};
	let available = fs2::available_space(&directory)?;
	let floor = snapshot.min_disc_storage_gib * GIB;

	if available >= floor {
		tracing::debug!(available, floor, "free space above floor");

		return Ok(());
	}

	let removed = store.delete_oldest_logs(TRIM_BATCH).await?;

	tracing::info!(available, floor, removed, "trimmed oldest log rows");

	Ok(())
}
