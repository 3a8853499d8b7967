//! HTTP probe: issue the configured request and compare status, headers,
//! and body against the expectations.

// crates.io
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	model::HttpSpec,
	probe::{ProbeFailure, ProbeResult},
};

/// Perform one HTTP attempt against `url`.
pub async fn probe(client: &Client, url: &str, timeout: Duration, spec: &HttpSpec) -> ProbeResult {
	let start = Instant::now();
	let mut request = client.request(spec.method.as_reqwest(), url).timeout(timeout);

	for (name, value) in &spec.req_headers {
		request = request.header(name.as_str(), value.as_str());
	}
	if !spec.req_body.is_empty() {
		request = request.body(spec.req_body.clone());
	}

	let response = match request.send().await {
		Ok(response) => response,
		Err(err) if err.is_timeout() =>
			return Err(ProbeFailure::at(start, Error::TimedOut { after_secs: timeout.as_secs() })),
		Err(err) => return Err(ProbeFailure::at(start, err.into())),
	};
	// Response time covers up to the response head; the body read below is
	// part of the verification, not the measurement.
	let elapsed = start.elapsed();
	let status = response.status().as_u16();

	if spec.res_status != 0 && status != spec.res_status {
		return Err(ProbeFailure {
			elapsed,
			source: Error::Protocol(format!(
				"response status is not matching the expected value, got: {status}, expected: {}",
				spec.res_status
			)),
		});
	}

	for (name, expected) in &spec.res_headers {
		let got = response
			.headers()
			.get(name.as_str())
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default();

		if got != expected {
			return Err(ProbeFailure {
				elapsed,
				source: Error::Protocol(format!(
					"response header is not matching expected header, key: {name}, got: {got}, \
					 expected: {expected}"
				)),
			});
		}
	}

	if spec.res_body.is_empty() {
		return Ok(elapsed);
	}

	let body = match response.bytes().await {
		Ok(body) => body,
		Err(err) => return Err(ProbeFailure { elapsed, source: err.into() }),
	};

	if body.as_ref() != spec.res_body.as_bytes() {
		return Err(ProbeFailure {
			elapsed,
			source: Error::Protocol(format!(
				"response body is not matching expected body, got: {}, expected: {}",
				String::from_utf8_lossy(&body),
				spec.res_body
			)),
		});
	}

	Ok(elapsed)
}
