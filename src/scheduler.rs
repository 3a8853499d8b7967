//! Scheduler core: one long-lived worker task per active test, control
//! consumers on the bus, periodic reconciliation against the store, and an
//! out-of-band timeout watchdog.
//!
//! The scheduler exclusively owns the map of live tests and their
//! cancellation tokens. Persistence is the system of record; the in-memory
//! map is a cache that reconciliation converges back onto the store, so a
//! lost control message heals within one reconcile interval.

// std
use std::collections::HashMap;
// crates.io
use rand::Rng;
use tokio::{sync::RwLock, time};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	alert::AlertPolicy,
	bus::{Bus, TOPIC_DEACTIVATE, TOPIC_DELETE, TOPIC_NEW},
	model::{Status, Test, TestSpec},
	probe::{self, ProbeContext},
	store::Store,
};

/// Interval between watchdog sweeps for stuck workers.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(2 * 60);
/// Interval between reconciliation passes against the store.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Await-timeout on control topics; expiry is a periodic wakeup, not an
/// error.
const CONTROL_POLL: Duration = Duration::from_secs(60);

const WATCHDOG_MESSAGE: &str =
	"test considered timed out; no outcome recorded within interval plus twice the timeout";

struct LiveTest {
	test: Test,
	cancel: CancellationToken,
}

struct Inner {
	store: Store,
	bus: Bus,
	policy: AlertPolicy,
	probes: ProbeContext,
	dev: bool,
	tests: RwLock<HashMap<String, LiveTest>>,
	shutdown: CancellationToken,
}

/// Handle to the running scheduler.
#[derive(Clone)]
pub struct Scheduler {
	inner: Arc<Inner>,
}
impl Scheduler {
	/// Assemble a scheduler; `shutdown` is the root token cancelling every
	/// worker and background task.
	pub fn new(
		store: Store,
		bus: Bus,
		policy: AlertPolicy,
		probes: ProbeContext,
		dev: bool,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				store,
				bus,
				policy,
				probes,
				dev,
				tests: RwLock::new(HashMap::new()),
				shutdown,
			}),
		}
	}

	/// Load active tests, start their workers and the background tasks,
	/// then wait for shutdown.
	pub async fn run(&self) -> Result<()> {
		for test in self.inner.store.list_active_tests().await? {
			if let Err(err) = self.install(test).await {
				tracing::warn!(error = %err, "could not start worker at boot");
			}
		}

		for topic in [TOPIC_NEW, TOPIC_DELETE, TOPIC_DEACTIVATE] {
			let scheduler = self.clone();

			tokio::spawn(async move { scheduler.consume_control(topic).await });
		}

		{
			let scheduler = self.clone();

			tokio::spawn(async move { scheduler.reconcile_loop().await });
		}
		{
			let scheduler = self.clone();

			tokio::spawn(async move { scheduler.watchdog_loop().await });
		}

		self.inner.shutdown.cancelled().await;

		Ok(())
	}

	/// Ids of the tests currently owned by a worker.
	pub async fn live_test_ids(&self) -> Vec<String> {
		let tests = self.inner.tests.read().await;

		tests.keys().cloned().collect()
	}

	/// The in-memory copy of a live test.
	pub async fn live_test(&self, test_id: &str) -> Option<Test> {
		let tests = self.inner.tests.read().await;

		tests.get(test_id).map(|live| live.test.clone())
	}

	/// Install (or replace) a test: cancel the old worker under the write
	/// lock, record `Initialized`, then spawn the fresh worker outside the
	/// lock.
	pub async fn install(&self, test: Test) -> Result<()> {
		test.validate()?;

		let cancel = self.inner.shutdown.child_token();

		{
			let mut tests = self.inner.tests.write().await;

			if let Some(previous) = tests.remove(&test.test_id) {
				previous.cancel.cancel();
			}

			tests.insert(
				test.test_id.clone(),
				LiveTest { test: test.clone(), cancel: cancel.clone() },
			);
		}

		self.inner
			.store
			.insert_log(&test.test_id, Status::Initialized, "", Duration::ZERO, Utc::now())
			.await?;

		tracing::info!(test = %test.test_id, kind = test.spec.kind(), "worker installed");

		let inner = self.inner.clone();

		tokio::spawn(async move { worker(inner, test, cancel).await });

		Ok(())
	}

	/// Cancel and forget a test's worker; `paused` additionally records a
	/// `Paused` log entry.
	pub async fn remove(&self, test_id: &str, paused: bool) -> Result<()> {
		let existed = {
			let mut tests = self.inner.tests.write().await;

			match tests.remove(test_id) {
				Some(live) => {
					live.cancel.cancel();

					true
				},
				None => false,
			}
		};

		// Waking any parked push worker; a topic may legitimately not exist.
		let _ = self.inner.bus.close(&format!("push:{test_id}")).await;

		if existed {
			tracing::info!(test = %test_id, paused, "worker removed");

			if paused {
				self.inner
					.store
					.insert_log(test_id, Status::Paused, "", Duration::ZERO, Utc::now())
					.await?;
			}
		}

		Ok(())
	}

	async fn consume_control(&self, topic: &'static str) {
		loop {
			let next = tokio::select! {
				_ = self.inner.shutdown.cancelled() => return,
				next = self.inner.bus.next(topic, CONTROL_POLL) => next,
			};

			match next {
				Ok(payload) =>
					if let Err(err) = self.apply_control(topic, &payload).await {
						tracing::warn!(topic, error = %err, "control message failed");
					},
				Err(Error::PushTimedOut) => {},
				Err(Error::TopicClosed) => return,
				Err(err) => tracing::warn!(topic, error = %err, "control consumer error"),
			}
		}
	}

	async fn apply_control(&self, topic: &str, payload: &[u8]) -> Result<()> {
		match topic {
			TOPIC_NEW => {
				let test: Test = serde_json::from_slice(payload)?;

				self.install(test).await
			},
			TOPIC_DELETE => {
				let test_id = String::from_utf8_lossy(payload);

				self.remove(&test_id, false).await
			},
			TOPIC_DEACTIVATE => {
				let test_id = String::from_utf8_lossy(payload);

				self.remove(&test_id, true).await
			},
			_ => Ok(()),
		}
	}

	async fn reconcile_loop(&self) {
		loop {
			tokio::select! {
				_ = self.inner.shutdown.cancelled() => return,
				_ = time::sleep(RECONCILE_INTERVAL) => {},
			}

			if let Err(err) = self.reconcile().await {
				tracing::warn!(error = %err, "reconciliation failed");
			}
		}
	}

	/// Diff the store against the in-memory map and republish control
	/// messages for anything out of sync. Idempotent when nothing changed.
	pub async fn reconcile(&self) -> Result<()> {
		tracing::debug!("looking for new/updated tests in the store");

		let db_tests = self.inner.store.list_active_tests().await?;
		let (changed, removed) = {
			let tests = self.inner.tests.read().await;
			let changed: Vec<Test> = db_tests
				.iter()
				.filter(|row| {
					tests.get(&row.test_id).map(|live| live.test != **row).unwrap_or(true)
				})
				.cloned()
				.collect();
			let removed: Vec<String> = tests
				.keys()
				.filter(|test_id| !db_tests.iter().any(|row| &row.test_id == *test_id))
				.cloned()
				.collect();

			(changed, removed)
		};

		for test in changed {
			let payload = serde_json::to_vec(&test)?;

			if let Err(err) = self.inner.bus.publish(TOPIC_NEW, payload).await {
				tracing::debug!(test = %test.test_id, error = %err, "reconcile publish dropped");
			}
		}
		for test_id in removed {
			if let Err(err) =
				self.inner.bus.publish(TOPIC_DELETE, test_id.clone().into_bytes()).await
			{
				tracing::debug!(test = %test_id, error = %err, "reconcile publish dropped");
			}
		}

		Ok(())
	}

	async fn watchdog_loop(&self) {
		loop {
			tokio::select! {
				_ = self.inner.shutdown.cancelled() => return,
				_ = time::sleep(WATCHDOG_INTERVAL) => {},
			}

			tracing::debug!("checking for timed out workers");

			if let Err(err) = self.watchdog_sweep().await {
				tracing::warn!(error = %err, "watchdog sweep failed");
			}
		}
	}

	/// Detect workers stuck beyond `interval + 2 * timeout` since their last
	/// log, record a `TimedOut` outcome for them, and force a restart by
	/// republishing on `new`.
	pub async fn watchdog_sweep(&self) -> Result<()> {
		let snapshot: Vec<Test> = {
			let tests = self.inner.tests.read().await;

			tests.values().map(|live| live.test.clone()).collect()
		};

		for test in snapshot {
			let Some(last) = self.inner.store.latest_test_log(&test.test_id).await? else {
				continue;
			};
			let allowance = test.interval + 2 * test.timeout;
			let Some(deadline) = chrono::TimeDelta::from_std(allowance)
				.ok()
				.and_then(|delta| last.created_at.checked_add_signed(delta))
			else {
				continue;
			};

			if Utc::now() <= deadline {
				continue;
			}

			tracing::error!(test = %test.test_id, "worker considered timed out");

			self.inner
				.store
				.insert_log(&test.test_id, Status::TimedOut, WATCHDOG_MESSAGE, allowance, Utc::now())
				.await?;

			if let Err(err) =
				self.inner.policy.handle(&test, Status::TimedOut, WATCHDOG_MESSAGE).await
			{
				tracing::warn!(test = %test.test_id, error = %err, "watchdog policy call failed");
			}

			let payload = serde_json::to_vec(&test)?;

			if let Err(err) = self.inner.bus.publish(TOPIC_NEW, payload).await {
				tracing::warn!(test = %test.test_id, error = %err, "watchdog restart dropped");
			}
		}

		Ok(())
	}
}

enum Attempt {
	Outcome { status: Status, elapsed: Duration, message: String },
	Retire,
}

async fn worker(inner: Arc<Inner>, test: Test, cancel: CancellationToken) {
	// Spread the fleet so a restart does not align every probe.
	if !inner.dev {
		let jitter = startup_jitter((test.interval + test.timeout) / 2);

		tokio::select! {
			_ = cancel.cancelled() => return,
			_ = time::sleep(jitter) => {},
		}
	}

	loop {
		let attempt = tokio::select! {
			_ = cancel.cancelled() => return,
			attempt = run_attempt(&inner, &test) => attempt,
		};

		// An outcome produced after cancellation is discarded: no log entry,
		// no policy call.
		if cancel.is_cancelled() {
			return;
		}

		let (status, elapsed, message) = match attempt {
			Attempt::Outcome { status, elapsed, message } => (status, elapsed, message),
			Attempt::Retire => return,
		};

		tracing::debug!(
			test = %test.test_id,
			status = status.name(),
			elapsed = ?elapsed,
			"probe outcome"
		);

		if let Err(err) =
			inner.store.insert_log(&test.test_id, status, &message, elapsed, Utc::now()).await
		{
			tracing::warn!(test = %test.test_id, error = %err, "could not write outcome log");
		}
		if let Err(err) = inner.policy.handle(&test, status, &message).await {
			tracing::warn!(test = %test.test_id, error = %err, "incident policy failed");
		}

		if !test.interval.is_zero() {
			tokio::select! {
				_ = cancel.cancelled() => return,
				_ = time::sleep(test.interval) => {},
			}
		}
	}
}

async fn run_attempt(inner: &Inner, test: &Test) -> Attempt {
	if test.spec.is_push() {
		return run_push_attempt(inner, test).await;
	}

	match time::timeout(test.timeout, probe::run(test, &inner.probes)).await {
		Ok(Ok(elapsed)) =>
			Attempt::Outcome { status: Status::Successful, elapsed, message: String::new() },
		Ok(Err(failure)) => Attempt::Outcome {
			status: if failure.source.is_timeout() { Status::TimedOut } else { Status::Error },
			elapsed: failure.elapsed,
			message: failure.source.to_string(),
		},
		Err(_) => Attempt::Outcome {
			status: Status::TimedOut,
			elapsed: test.timeout,
			message: Error::TimedOut { after_secs: test.timeout.as_secs() }.to_string(),
		},
	}
}

async fn run_push_attempt(inner: &Inner, test: &Test) -> Attempt {
	let start = Instant::now();

	match inner.bus.next(&test.push_topic(), test.timeout).await {
		Ok(payload) => match &test.spec {
			TestSpec::PrometheusPush(spec) => {
				let body = String::from_utf8_lossy(&payload);

				match probe::prometheus::evaluate(
					&test.test_id,
					&body,
					&spec.metric_tests,
					&inner.probes.counters,
				) {
					Ok(()) => Attempt::Outcome {
						status: Status::Successful,
						elapsed: start.elapsed(),
						message: String::new(),
					},
					Err(err) => Attempt::Outcome {
						status: Status::Error,
						elapsed: start.elapsed(),
						message: err.to_string(),
					},
				}
			},
			_ => Attempt::Outcome {
				status: Status::Successful,
				elapsed: start.elapsed(),
				message: String::new(),
			},
		},
		Err(Error::PushTimedOut) => Attempt::Outcome {
			status: Status::TimedOut,
			elapsed: start.elapsed(),
			message: Error::PushTimedOut.to_string(),
		},
		// The topic is closed when the test is deleted or deactivated; the
		// cancellation token races this, so just retire quietly.
		Err(Error::TopicClosed) => Attempt::Retire,
		Err(err) => Attempt::Outcome {
			status: Status::Error,
			elapsed: start.elapsed(),
			message: err.to_string(),
		},
	}
}

fn startup_jitter(max: Duration) -> Duration {
	if max.is_zero() {
		return Duration::ZERO;
	}

	let mut rng = rand::rng();

	Duration::from_secs_f64(rng.random_range(0.0..=max.as_secs_f64()))
}
