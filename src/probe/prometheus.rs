//! Prometheus probe: scrape (or accept a pushed) exposition document and
//! evaluate the configured metric bounds.

// std
use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};
// crates.io
use prometheus_parse::{Sample, Scrape, Value};
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	model::MetricTest,
	probe::{ProbeFailure, ProbeResult},
};

/// Process-local memory of the last observed counter values, keyed by
/// `(test_id, metric key, sorted labels)`.
///
/// The map is lost on restart; the first observation after a restart is
/// absorbed without comparison, exactly like the very first observation of
/// a counter.
#[derive(Clone, Debug, Default)]
pub struct CounterMemory {
	inner: Arc<Mutex<HashMap<String, f64>>>,
}
impl CounterMemory {
	/// Create an empty memory.
	pub fn new() -> Self {
		Self::default()
	}

	// Remember `value` and return the increment since the previous
	// observation, if there was one.
	fn observe(&self, key: String, value: f64) -> Option<f64> {
		let mut inner = self.inner.lock().expect("counter memory lock poisoned");

		inner.insert(key, value).map(|previous| value - previous)
	}
}

/// Scrape `url` and evaluate the metric tests against the body.
pub async fn probe(
	client: &Client,
	test_id: &str,
	url: &str,
	timeout: Duration,
	metric_tests: &[MetricTest],
	counters: &CounterMemory,
) -> ProbeResult {
	let start = Instant::now();
	let response = match client.get(url).timeout(timeout).send().await {
		Ok(response) => response,
		Err(err) if err.is_timeout() =>
			return Err(ProbeFailure::at(start, Error::TimedOut { after_secs: timeout.as_secs() })),
		Err(err) => return Err(ProbeFailure::at(start, err.into())),
	};
	let body = match response.text().await {
		Ok(body) => body,
		Err(err) => return Err(ProbeFailure::at(start, err.into())),
	};
	let elapsed = start.elapsed();

	match evaluate(test_id, &body, metric_tests, counters) {
		Ok(()) => Ok(elapsed),
		Err(err) => Err(ProbeFailure { elapsed, source: err }),
	}
}

/// Evaluate metric tests against an exposition document (shared by the
/// poll probe and the push path).
pub fn evaluate(
	test_id: &str,
	body: &str,
	metric_tests: &[MetricTest],
	counters: &CounterMemory,
) -> Result<()> {
	let scrape = Scrape::parse(body.lines().map(|line| Ok(line.to_string())))
		.map_err(|err| Error::Protocol(format!("invalid prometheus exposition: {err}")))?;

	for metric_test in metric_tests {
		let samples: Vec<&Sample> =
			scrape.samples.iter().filter(|sample| sample.metric == metric_test.key).collect();

		if samples.is_empty() {
			return Err(Error::Protocol(format!("invalid prometheus key: {}", metric_test.key)));
		}

		let mut one_match = false;

		for sample in samples {
			if !labels_match(sample, &metric_test.labels) {
				continue;
			}

			one_match = true;

			match sample.value {
				Value::Gauge(value) => {
					if value < metric_test.lower_bound || value > metric_test.upper_bound {
						return Err(Error::Protocol(format!(
							"expected key: {} GAUGE to be between {:.3} and {:.3} got: {value:.3}",
							metric_test.key, metric_test.lower_bound, metric_test.upper_bound
						)));
					}
				},
				Value::Counter(value) => {
					let key = counter_key(test_id, &metric_test.key, &metric_test.labels);

					// First observation: remember the value, compare nothing.
					if let Some(increase) = counters.observe(key, value)
						&& (increase < metric_test.lower_bound
							|| increase > metric_test.upper_bound)
					{
						return Err(Error::Protocol(format!(
							"expected key: {} COUNTER to increase between {:.3} and {:.3} got: \
							 {increase:.3}",
							metric_test.key, metric_test.lower_bound, metric_test.upper_bound
						)));
					}
				},
				_ => {},
			}
		}

		if !one_match {
			return Err(Error::Protocol(format!(
				"no matching labels for prometheus key: {} with labels: {:?}",
				metric_test.key, metric_test.labels
			)));
		}
	}

	Ok(())
}

fn labels_match(sample: &Sample, wanted: &HashMap<String, String>) -> bool {
	wanted.iter().all(|(name, value)| sample.labels.get(name) == Some(value.as_str()))
}

fn counter_key(test_id: &str, metric_key: &str, labels: &HashMap<String, String>) -> String {
	let mut parts: Vec<&str> = Vec::with_capacity(labels.len() * 2);

	for (name, value) in labels {
		parts.push(name);
		parts.push(value);
	}

	parts.sort_unstable();

	format!("{test_id}{metric_key}{}", parts.concat())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const EXPOSITION: &str = "\
# HELP queue_depth Current queue depth.
# TYPE queue_depth gauge
queue_depth{shard=\"a\"} 7
queue_depth{shard=\"b\"} 80
# HELP requests_total Requests served.
# TYPE requests_total counter
requests_total{shard=\"a\"} 100
";

	fn metric(key: &str, lower: f64, upper: f64, labels: &[(&str, &str)]) -> MetricTest {
		MetricTest {
			key: key.into(),
			lower_bound: lower,
			upper_bound: upper,
			labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
		}
	}

	#[test]
	fn gauges_are_bounds_checked_per_matching_sample() {
		let counters = CounterMemory::new();

		assert!(
			evaluate("t1", EXPOSITION, &[metric("queue_depth", 0., 10., &[("shard", "a")])],
				&counters)
				.is_ok()
		);
		assert!(
			evaluate("t1", EXPOSITION, &[metric("queue_depth", 0., 10., &[("shard", "b")])],
				&counters)
				.is_err()
		);
	}

	#[test]
	fn unknown_keys_and_labels_are_rejected() {
		let counters = CounterMemory::new();

		assert!(evaluate("t1", EXPOSITION, &[metric("nope", 0., 1., &[])], &counters).is_err());
		assert!(
			evaluate("t1", EXPOSITION, &[metric("queue_depth", 0., 100., &[("shard", "z")])],
				&counters)
				.is_err()
		);
	}

	#[test]
	fn first_counter_observation_is_absorbed() {
		let counters = CounterMemory::new();
		let tests = [metric("requests_total", 0., 5., &[("shard", "a")])];

		// First pass: out-of-bounds absolute value, but nothing to compare.
		assert!(evaluate("t1", EXPOSITION, &tests, &counters).is_ok());

		// Second pass with +200: increment exceeds the bound.
		let bumped = EXPOSITION.replace("requests_total{shard=\"a\"} 100", "requests_total{shard=\"a\"} 300");

		assert!(evaluate("t1", &bumped, &tests, &counters).is_err());

		// Third pass with +2: increment within bounds again.
		let settled = bumped.replace("requests_total{shard=\"a\"} 300", "requests_total{shard=\"a\"} 302");

		assert!(evaluate("t1", &settled, &tests, &counters).is_ok());
	}

	#[test]
	fn counter_memory_is_scoped_per_test() {
		let counters = CounterMemory::new();
		let tests = [metric("requests_total", 0., 5., &[("shard", "a")])];

		assert!(evaluate("t1", EXPOSITION, &tests, &counters).is_ok());
		// A different test id gets its own first observation.
		assert!(evaluate("t2", EXPOSITION, &tests, &counters).is_ok());
	}
}
