//! Integration tests for the incident lifecycle and notification policy.

// std
use std::{collections::HashMap, time::Duration};
// crates.io
use chrono::{TimeDelta, Utc};
use pingr::{
	AlertPolicy, Config, ConfigHandle, Contact, ContactKind, Notifier, SealKey, Status, Store,
	Test, TestContact, TestSpec,
	model::{HttpMethod, HttpSpec},
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

fn test_config() -> Config {
	Config {
		dev: true,
		base_url: "http://localhost:8080".into(),
		port: 8080,
		sqlite_path: "pingr.sqlite".into(),
		sqlite_migrate: false,
		basic_auth_user: "admin".into(),
		basic_auth_pass: "admin".into(),
		term_duration: Duration::from_secs(20),
		smtp_host: "localhost".into(),
		smtp_port: 587,
		smtp_username: "pingr@example.com".into(),
		smtp_password: String::new(),
		seal_key: SealKey::from_hex(&"ab".repeat(32)).expect("key"),
		min_disc_storage_gib: 5,
	}
}

fn http_test(id: &str) -> Test {
	Test {
		test_id: id.into(),
		test_name: format!("test {id}"),
		url: "https://example.com/".into(),
		interval: Duration::from_secs(60),
		timeout: Duration::from_secs(5),
		created_at: Utc::now(),
		active: true,
		spec: TestSpec::Http(HttpSpec {
			method: HttpMethod::Get,
			req_headers: HashMap::new(),
			req_body: String::new(),
			res_status: 200,
			res_headers: HashMap::new(),
			res_body: String::new(),
		}),
	}
}

fn webhook_contact(id: &str, url: String) -> Contact {
	Contact {
		contact_id: id.into(),
		contact_name: format!("contact {id}"),
		contact_type: ContactKind::Http,
		contact_url: url,
	}
}

async fn policy_fixture(store: &Store) -> AlertPolicy {
	let _ = tracing_subscriber::fmt::try_init();

	let config = ConfigHandle::new(test_config());
	let notifier = Notifier::new(config, store.clone(), reqwest::Client::new());

	AlertPolicy::new(store.clone(), notifier)
}

// Replays one probe outcome: write the log entry, then hand it to the
// policy, exactly as the worker does.
async fn outcome(
	policy: &AlertPolicy,
	store: &Store,
	test: &Test,
	status: Status,
	message: &str,
	offset_secs: i64,
) {
	store
		.insert_log(
			&test.test_id,
			status,
			message,
			Duration::from_millis(10),
			Utc::now() + TimeDelta::seconds(offset_secs),
		)
		.await
		.expect("log");
	policy.handle(test, status, message).await.expect("policy");
}

#[tokio::test]
async fn thresholds_gate_notifications_and_recovery_closes_once() {
	let server = MockServer::start().await;

	// c-a (threshold 2): one failure dispatch + one recovery = 2 calls.
	Mock::given(method("POST"))
		.and(path("/hook-a"))
		.respond_with(ResponseTemplate::new(200))
		.expect(2)
		.mount(&server)
		.await;
	// c-b (threshold 3): one failure dispatch + one recovery = 2 calls.
	Mock::given(method("POST"))
		.and(path("/hook-b"))
		.respond_with(ResponseTemplate::new(200))
		.expect(2)
		.mount(&server)
		.await;

	let store = Store::open_in_memory().await.expect("store");
	let policy = policy_fixture(&store).await;
	let test = http_test("t2");

	store.insert_test(&test).await.expect("insert");
	store
		.insert_contact(&webhook_contact("c-a", format!("{}/hook-a", server.uri())))
		.await
		.expect("contact");
	store
		.insert_contact(&webhook_contact("c-b", format!("{}/hook-b", server.uri())))
		.await
		.expect("contact");
	store
		.insert_test_contact(&TestContact {
			test_id: "t2".into(),
			contact_id: "c-a".into(),
			threshold: 2,
		})
		.await
		.expect("edge");
	store
		.insert_test_contact(&TestContact {
			test_id: "t2".into(),
			contact_id: "c-b".into(),
			threshold: 3,
		})
		.await
		.expect("edge");
	store
		.insert_log(&test.test_id, Status::Initialized, "", Duration::ZERO, Utc::now())
		.await
		.expect("log");

	// Probe #1: incident opens with its root cause, nobody notified yet.
	outcome(&policy, &store, &test, Status::Error, "status 500", 1).await;

	let incident = store.active_incident_for("t2").await.expect("query").expect("incident");

	assert_eq!(incident.root_cause, "status 500");
	assert!(store.incident_contacts(incident.incident_id).await.expect("icl").is_empty());

	// Probe #2: c-a crosses its threshold.
	outcome(&policy, &store, &test, Status::Error, "status 500", 2).await;

	let notified = store.incident_contacts(incident.incident_id).await.expect("icl");

	assert_eq!(notified.len(), 1);
	assert_eq!(notified[0].contact_id, "c-a");

	// Probe #3: c-b follows.
	outcome(&policy, &store, &test, Status::Error, "status 500", 3).await;
	assert_eq!(store.incident_contacts(incident.incident_id).await.expect("icl").len(), 2);

	// Probe #4: everyone already notified, no additional dispatches.
	outcome(&policy, &store, &test, Status::Error, "status 500", 4).await;
	assert_eq!(store.incident_contacts(incident.incident_id).await.expect("icl").len(), 2);

	// Probe #5: recovery notifies both and closes the incident.
	outcome(&policy, &store, &test, Status::Successful, "", 5).await;

	assert!(store.active_incident_for("t2").await.expect("query").is_none());

	let closed = store
		.list_test_logs("t2")
		.await
		.expect("logs")
		.into_iter()
		.filter(|log| log.status == Status::Successful)
		.count();

	assert_eq!(closed, 1);
	server.verify().await;
}

#[tokio::test]
async fn success_without_an_incident_is_a_no_op() {
	let store = Store::open_in_memory().await.expect("store");
	let policy = policy_fixture(&store).await;
	let test = http_test("t1");

	store.insert_test(&test).await.expect("insert");
	outcome(&policy, &store, &test, Status::Successful, "", 0).await;

	assert!(store.active_incident_for("t1").await.expect("query").is_none());
}

#[tokio::test]
async fn at_most_one_incident_is_open_per_test() {
	let store = Store::open_in_memory().await.expect("store");
	let policy = policy_fixture(&store).await;
	let test = http_test("t3");

	store.insert_test(&test).await.expect("insert");

	for i in 0..3 {
		outcome(&policy, &store, &test, Status::Error, "boom", i).await;
	}

	let open: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM incidents WHERE active AND test_id = 't3'",
	)
	.fetch_one(store.pool())
	.await
	.expect("count");

	assert_eq!(open, 1);
}

#[tokio::test]
async fn failed_recovery_dispatch_keeps_the_incident_open() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/hook"))
		.respond_with(ResponseTemplate::new(200))
		.mount(&server)
		.await;

	let store = Store::open_in_memory().await.expect("store");
	let policy = policy_fixture(&store).await;
	let test = http_test("t4");

	store.insert_test(&test).await.expect("insert");
	store
		.insert_contact(&webhook_contact("c-x", format!("{}/hook", server.uri())))
		.await
		.expect("contact");
	store
		.insert_test_contact(&TestContact {
			test_id: "t4".into(),
			contact_id: "c-x".into(),
			threshold: 1,
		})
		.await
		.expect("edge");
	store
		.insert_log(&test.test_id, Status::Initialized, "", Duration::ZERO, Utc::now())
		.await
		.expect("log");

	outcome(&policy, &store, &test, Status::Error, "boom", 1).await;

	let incident = store.active_incident_for("t4").await.expect("query").expect("incident");

	assert_eq!(store.incident_contacts(incident.incident_id).await.expect("icl").len(), 1);

	// The webhook target goes away; recovery cannot be delivered, so the
	// incident must stay open for the next successful probe to retry.
	drop(server);
	outcome(&policy, &store, &test, Status::Successful, "", 2).await;

	assert!(store.active_incident_for("t4").await.expect("query").is_some());
}

#[tokio::test]
async fn dispatch_failures_do_not_record_contact_log_rows() {
	let store = Store::open_in_memory().await.expect("store");
	let policy = policy_fixture(&store).await;
	let test = http_test("t5");

	store.insert_test(&test).await.expect("insert");
	// Unroutable sink: every dispatch fails.
	store
		.insert_contact(&webhook_contact("c-dead", "http://127.0.0.1:1/hook".into()))
		.await
		.expect("contact");
	store
		.insert_test_contact(&TestContact {
			test_id: "t5".into(),
			contact_id: "c-dead".into(),
			threshold: 1,
		})
		.await
		.expect("edge");
	store
		.insert_log(&test.test_id, Status::Initialized, "", Duration::ZERO, Utc::now())
		.await
		.expect("log");

	outcome(&policy, &store, &test, Status::Error, "boom", 1).await;

	let incident = store.active_incident_for("t5").await.expect("query").expect("incident");

	// Failure was not delivered: no contact-log row, so the next failing
	// probe will try this contact again.
	assert!(store.incident_contacts(incident.incident_id).await.expect("icl").is_empty());
}
