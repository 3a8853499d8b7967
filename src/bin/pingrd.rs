//! The pingr daemon: wires config, store, bus, scheduler, push surface,
//! and maintenance together, then waits for signals.

// crates.io
use tokio::time;
use tokio_util::sync::CancellationToken;
// self
use pingr::{
	AlertPolicy, Bus, Config, ConfigHandle, Notifier, ProbeContext, Scheduler, Store, logging,
	maintenance, serve,
};

#[tokio::main]
async fn main() {
	// Mandatory settings missing or malformed: abort before anything runs.
	let config = match Config::from_env() {
		Ok(config) => config,
		Err(err) => {
			eprintln!("pingrd: {err}");
			std::process::exit(1);
		},
	};

	logging::init(config.dev);

	if let Err(err) = run(config).await {
		tracing::error!(error = %err, "fatal");
		std::process::exit(1);
	}
}

async fn run(config: Config) -> pingr::Result<()> {
	tracing::info!(pid = std::process::id(), "starting pingr");

	let handle = ConfigHandle::new(config.clone());
	let store = Store::open(&config.sqlite_path, config.sqlite_migrate).await?;
	let bus = Bus::new();
	let probes = ProbeContext::new(config.seal_key.clone())?;
	let notifier = Notifier::new(handle.clone(), store.clone(), probes.http.clone());
	let policy = AlertPolicy::new(store.clone(), notifier);
	let shutdown = CancellationToken::new();
	let scheduler =
		Scheduler::new(store.clone(), bus.clone(), policy, probes, config.dev, shutdown.clone());

	{
		let router = serve::router(store.clone(), bus.clone());
		let shutdown = shutdown.clone();
		let port = config.port;

		tokio::spawn(async move {
			if let Err(err) = serve::serve(router, port, shutdown).await {
				tracing::error!(error = %err, "push endpoint failed");
			}
		});
	}
	{
		let store = store.clone();
		let handle = handle.clone();
		let shutdown = shutdown.clone();

		tokio::spawn(async move { maintenance::run(store, handle, shutdown).await });
	}

	let engine = {
		let scheduler = scheduler.clone();

		tokio::spawn(async move { scheduler.run().await })
	};

	wait_for_shutdown(&handle).await?;

	tracing::info!("got SIGINT/SIGTERM, exiting");
	shutdown.cancel();

	let grace = handle.snapshot().term_duration;

	if time::timeout(grace, engine).await.is_err() {
		tracing::warn!("forcing termination");
	}

	tracing::info!("terminating service");

	Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(handle: &ConfigHandle) -> pingr::Result<()> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut interrupt = signal(SignalKind::interrupt())?;
	let mut terminate = signal(SignalKind::terminate())?;
	let mut hangup = signal(SignalKind::hangup())?;

	loop {
		tokio::select! {
			_ = interrupt.recv() => return Ok(()),
			_ = terminate.recv() => return Ok(()),
			_ = hangup.recv() => match handle.reload() {
				Ok(()) => tracing::info!("got SIGHUP, configuration reloaded"),
				Err(err) => tracing::warn!(error = %err, "could not reload configuration"),
			},
		}
	}
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &ConfigHandle) -> pingr::Result<()> {
	tokio::signal::ctrl_c().await?;

	Ok(())
}
