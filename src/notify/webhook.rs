//! JSON webhook sink.

// crates.io
use reqwest::Client;
use serde::Serialize;
// self
use crate::{_prelude::*, model::Test, notify::Notice};

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Serialize)]
struct WebhookPayload<'a> {
	test_id: &'a str,
	test_name: &'a str,
	url: &'a str,
	test_type: &'a str,
	status_code: i64,
	status_name: &'a str,
	message: &'a str,
	interval: u64,
}

/// POST the notice as JSON to the contact's URL.
pub async fn send(client: &Client, url: &str, test: &Test, notice: Notice<'_>) -> Result<()> {
	let status = notice.status();
	let payload = WebhookPayload {
		test_id: &test.test_id,
		test_name: &test.test_name,
		url: &test.url,
		test_type: test.spec.kind(),
		status_code: status.id(),
		status_name: match status.id() {
			1 => "Test successful",
			2 => "Test failure",
			3 => "Test timed out",
			_ => status.name(),
		},
		message: notice.message(),
		interval: test.interval.as_secs(),
	};

	client
		.post(url)
		.json(&payload)
		.timeout(DISPATCH_TIMEOUT)
		.send()
		.await
		.map_err(|err| Error::Dispatch(format!("webhook POST to {url} failed: {err}")))?;

	Ok(())
}
