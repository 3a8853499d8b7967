//! Active probes: one entry point per test kind.
//!
//! Every probe returns the elapsed time measured from just before the first
//! network syscall, even when the attempt fails. Push kinds never reach
//! [`run`] — their payloads arrive over the bus and only the Prometheus
//! evaluation in [`prometheus`] is shared.

pub mod dns;
pub mod http;
pub mod ping;
pub mod prometheus;
pub mod resolvers;
pub mod ssh;
pub mod tcp;
pub mod tls;

// self
use crate::{
	_prelude::*,
	model::{Test, TestSpec},
	secret::SealKey,
};

/// A failing probe attempt: elapsed time at the point of failure plus cause.
#[derive(Debug)]
pub struct ProbeFailure {
	/// Time spent before the attempt failed.
	pub elapsed: Duration,
	/// What went wrong.
	pub source: Error,
}
impl ProbeFailure {
	/// Capture the elapsed time since `start` alongside the cause.
	pub fn at(start: Instant, source: Error) -> Self {
		Self { elapsed: start.elapsed(), source }
	}
}

/// Outcome of one probe attempt.
pub type ProbeResult = std::result::Result<Duration, ProbeFailure>;

/// Shared probe dependencies, cheap to clone.
#[derive(Clone, Debug)]
pub struct ProbeContext {
	/// Shared HTTP client (HTTP probe, Prometheus scrape, OCSP, webhooks).
	pub http: reqwest::Client,
	/// Lazily bootstrapped public resolver list for the DNS probe.
	pub resolvers: resolvers::ResolverProvider,
	/// Process-local Prometheus counter memory.
	pub counters: prometheus::CounterMemory,
	/// Key unsealing SSH credentials for the duration of an attempt.
	pub seal_key: SealKey,
}
impl ProbeContext {
	/// Build a context with a fresh HTTP client.
	pub fn new(seal_key: SealKey) -> Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent(format!("pingr/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()?;

		Ok(Self {
			resolvers: resolvers::ResolverProvider::new(http.clone()),
			counters: prometheus::CounterMemory::new(),
			http,
			seal_key,
		})
	}
}

/// Run one poll attempt for the test.
pub async fn run(test: &Test, ctx: &ProbeContext) -> ProbeResult {
	match &test.spec {
		TestSpec::Http(spec) => http::probe(&ctx.http, &test.url, test.timeout, spec).await,
		TestSpec::Tcp(spec) => tcp::probe(&test.url, spec.port, test.timeout).await,
		TestSpec::Tls(spec) => tls::probe(&ctx.http, &test.url, spec.port, test.timeout).await,
		TestSpec::Ping(_) => ping::probe(&test.url, test.timeout).await,
		TestSpec::Ssh(spec) =>
			ssh::probe(&test.url, test.timeout, spec, &ctx.seal_key).await,
		TestSpec::Dns(spec) => {
			let servers = ctx.resolvers.get().await;

			dns::probe(&servers, &test.url, test.timeout, spec).await
		},
		TestSpec::Prometheus(spec) =>
			prometheus::probe(
				&ctx.http,
				&test.test_id,
				&test.url,
				test.timeout,
				&spec.metric_tests,
				&ctx.counters,
			)
			.await,
		TestSpec::HttpPush(_) | TestSpec::PrometheusPush(_) => Err(ProbeFailure {
			elapsed: Duration::ZERO,
			source: Error::Validation {
				field: "test_type",
				reason: "Push kinds are driven by the bus, not the probe library.".into(),
			},
		}),
	}
}
