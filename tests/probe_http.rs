//! Integration tests for the HTTP probe.

// std
use std::{collections::HashMap, time::Duration};
// crates.io
use pingr::{Error, probe::http};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_string, header, method, path},
};

fn spec(res_status: u16) -> pingr::model::HttpSpec {
	pingr::model::HttpSpec {
		method: pingr::model::HttpMethod::Get,
		req_headers: HashMap::new(),
		req_body: String::new(),
		res_status,
		res_headers: HashMap::new(),
		res_body: String::new(),
	}
}

#[tokio::test]
async fn happy_path_measures_response_time() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/health"))
		.respond_with(ResponseTemplate::new(200).set_body_string("OK"))
		.expect(1)
		.mount(&server)
		.await;

	let client = reqwest::Client::new();
	let elapsed =
		http::probe(&client, &format!("{}/health", server.uri()), Duration::from_secs(5), &spec(200))
			.await
			.expect("probe");

	assert!(elapsed > Duration::ZERO);
	server.verify().await;
}

#[tokio::test]
async fn post_sends_configured_headers_and_body() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/ingest"))
		.and(header("x-probe", "pingr"))
		.and(body_string("{\"ping\":1}"))
		.respond_with(ResponseTemplate::new(204))
		.expect(1)
		.mount(&server)
		.await;

	let mut spec = spec(204);

	spec.method = pingr::model::HttpMethod::Post;
	spec.req_headers.insert("x-probe".into(), "pingr".into());
	spec.req_body = "{\"ping\":1}".into();

	let client = reqwest::Client::new();

	http::probe(&client, &format!("{}/ingest", server.uri()), Duration::from_secs(5), &spec)
		.await
		.expect("probe");
	server.verify().await;
}

#[tokio::test]
async fn unexpected_status_fails_with_elapsed_time() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&server)
		.await;

	let client = reqwest::Client::new();
	let failure = http::probe(&client, &server.uri(), Duration::from_secs(5), &spec(200))
		.await
		.expect_err("status mismatch");

	assert!(matches!(failure.source, Error::Protocol(_)));
	assert!(failure.elapsed > Duration::ZERO);
}

#[tokio::test]
async fn zero_expected_status_accepts_anything() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(503))
		.mount(&server)
		.await;

	let client = reqwest::Client::new();

	http::probe(&client, &server.uri(), Duration::from_secs(5), &spec(0))
		.await
		.expect("any status accepted");
}

#[tokio::test]
async fn expected_header_mismatch_fails() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/plain"))
		.mount(&server)
		.await;

	let mut spec = spec(200);

	spec.res_headers.insert("content-type".into(), "application/json".into());

	let client = reqwest::Client::new();
	let failure = http::probe(&client, &server.uri(), Duration::from_secs(5), &spec)
		.await
		.expect_err("header mismatch");

	assert!(failure.source.to_string().contains("content-type"));
}

#[tokio::test]
async fn expected_body_must_match_byte_exactly() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(200).set_body_string("OK "))
		.mount(&server)
		.await;

	let mut spec = spec(200);

	spec.res_body = "OK".into();

	let client = reqwest::Client::new();

	assert!(
		http::probe(&client, &server.uri(), Duration::from_secs(5), &spec).await.is_err()
	);
}

#[tokio::test]
async fn slow_responses_time_out() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;

	let client = reqwest::Client::new();
	let failure = http::probe(&client, &server.uri(), Duration::from_millis(200), &spec(200))
		.await
		.expect_err("timeout");

	assert!(failure.source.is_timeout());
}
