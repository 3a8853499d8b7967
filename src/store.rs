//! Typed queries over the relational store.
//!
//! Persistence is the system of record; the scheduler's in-memory map is a
//! cache reconciled against these tables. Only the narrow operation set the
//! engine needs is exposed; the admin surface drives the same queries.

pub mod schema;

// std
use std::path::Path;
// crates.io
use sqlx::{
	FromRow, SqlitePool,
	sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
// self
use crate::{
	_prelude::*,
	model::{Contact, ContactKind, Incident, LogEntry, Status, Test, TestContact, TestSpec},
};

/// Handle to the SQLite-backed store.
#[derive(Clone, Debug)]
pub struct Store {
	pool: SqlitePool,
}
impl Store {
	/// Open (creating if missing) the database file; migrates on a fresh
	/// file or when `force_migrate` is set.
	pub async fn open(path: &Path, force_migrate: bool) -> Result<Self> {
		let fresh = !path.exists();
		// The schema declares FK edges for documentation, but `contacts` has
		// no primary key, so the enforcement pragma would reject valid rows.
		let options =
			SqliteConnectOptions::new().filename(path).create_if_missing(true).foreign_keys(false);
		let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;
		let store = Self { pool };

		if fresh || force_migrate {
			schema::migrate(&store.pool).await?;
		}

		Ok(store)
	}

	/// Open a migrated in-memory database (tests and ephemeral runs).
	pub async fn open_in_memory() -> Result<Self> {
		let options = SqliteConnectOptions::new().in_memory(true).foreign_keys(false);
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.min_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(options)
			.await?;
		let store = Self { pool };

		schema::migrate(&store.pool).await?;

		Ok(store)
	}

	/// Access the underlying pool (admin surface, maintenance).
	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	// --- tests ---

	/// All tests, ordered by name.
	pub async fn list_tests(&self) -> Result<Vec<Test>> {
		let rows = sqlx::query_as::<_, TestRow>("SELECT * FROM tests ORDER BY test_name")
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(TestRow::into_test).collect()
	}

	/// All tests the scheduler should be running.
	pub async fn list_active_tests(&self) -> Result<Vec<Test>> {
		let rows =
			sqlx::query_as::<_, TestRow>("SELECT * FROM tests WHERE active ORDER BY test_name")
				.fetch_all(&self.pool)
				.await?;

		rows.into_iter().map(TestRow::into_test).collect()
	}

	/// A single test by id.
	pub async fn get_test(&self, test_id: &str) -> Result<Test> {
		sqlx::query_as::<_, TestRow>("SELECT * FROM tests WHERE test_id = ?")
			.bind(test_id)
			.fetch_optional(&self.pool)
			.await?
			.ok_or(Error::NotFound)?
			.into_test()
	}

	/// Insert a new test row.
	pub async fn insert_test(&self, test: &Test) -> Result<()> {
		sqlx::query(
			"INSERT INTO tests(test_id, test_name, test_type, url, interval, timeout, created_at, \
			 active, blob) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&test.test_id)
		.bind(&test.test_name)
		.bind(test.spec.kind())
		.bind(&test.url)
		.bind(test.interval.as_secs() as i64)
		.bind(test.timeout.as_secs() as i64)
		.bind(test.created_at)
		.bind(test.active)
		.bind(encode_spec(&test.spec)?)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Replace an existing test row.
	pub async fn update_test(&self, test: &Test) -> Result<()> {
		sqlx::query(
			"UPDATE tests SET test_name = ?, test_type = ?, url = ?, interval = ?, timeout = ?, \
			 created_at = ?, active = ?, blob = ? WHERE test_id = ?",
		)
		.bind(&test.test_name)
		.bind(test.spec.kind())
		.bind(&test.url)
		.bind(test.interval.as_secs() as i64)
		.bind(test.timeout.as_secs() as i64)
		.bind(test.created_at)
		.bind(test.active)
		.bind(encode_spec(&test.spec)?)
		.bind(&test.test_id)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Remove a test row.
	pub async fn delete_test(&self, test_id: &str) -> Result<()> {
		sqlx::query("DELETE FROM tests WHERE test_id = ?").bind(test_id).execute(&self.pool).await?;

		Ok(())
	}

	/// Flip a test's active flag.
	pub async fn set_active(&self, test_id: &str, active: bool) -> Result<()> {
		sqlx::query("UPDATE tests SET active = ? WHERE test_id = ?")
			.bind(active)
			.bind(test_id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	// --- logs ---

	/// Append one outcome log.
	pub async fn insert_log(
		&self,
		test_id: &str,
		status: Status,
		message: &str,
		response_time: Duration,
		created_at: DateTime<Utc>,
	) -> Result<()> {
		sqlx::query(
			"INSERT INTO logs(test_id, status_id, message, response_time, created_at) VALUES (?, \
			 ?, ?, ?, ?)",
		)
		.bind(test_id)
		.bind(status.id())
		.bind(message)
		.bind(response_time.as_millis() as i64)
		.bind(created_at)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// The most recent log for a test, if any.
	pub async fn latest_test_log(&self, test_id: &str) -> Result<Option<LogEntry>> {
		sqlx::query_as::<_, LogRow>(
			"SELECT * FROM logs WHERE test_id = ? ORDER BY created_at DESC LIMIT 1",
		)
		.bind(test_id)
		.fetch_optional(&self.pool)
		.await?
		.map(LogRow::into_log)
		.transpose()
	}

	/// All logs for a test, newest first.
	pub async fn list_test_logs(&self, test_id: &str) -> Result<Vec<LogEntry>> {
		let rows = sqlx::query_as::<_, LogRow>(
			"SELECT * FROM logs WHERE test_id = ? ORDER BY created_at DESC",
		)
		.bind(test_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(LogRow::into_log).collect()
	}

	/// The newest `limit` logs for a test.
	pub async fn list_test_logs_limited(&self, test_id: &str, limit: u32) -> Result<Vec<LogEntry>> {
		let rows = sqlx::query_as::<_, LogRow>(
			"SELECT * FROM logs WHERE test_id = ? ORDER BY created_at DESC LIMIT ?",
		)
		.bind(test_id)
		.bind(limit)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(LogRow::into_log).collect()
	}

	/// Logs for a test written within the trailing `days` window.
	pub async fn list_test_logs_since(&self, test_id: &str, days: u32) -> Result<Vec<LogEntry>> {
		let rows = sqlx::query_as::<_, LogRow>(
			"SELECT * FROM logs WHERE test_id = ? AND julianday(created_at) > julianday('now', \
			 '-'||?||' days') ORDER BY created_at DESC",
		)
		.bind(test_id)
		.bind(days)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(LogRow::into_log).collect()
	}

	/// Drop all logs for a test.
	pub async fn delete_test_logs(&self, test_id: &str) -> Result<()> {
		sqlx::query("DELETE FROM logs WHERE test_id = ?")
			.bind(test_id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	/// Drop the `n` oldest log rows across all tests (disk maintenance).
	pub async fn delete_oldest_logs(&self, n: u32) -> Result<u64> {
		let result = sqlx::query(
			"DELETE FROM logs WHERE log_id IN (SELECT log_id FROM logs ORDER BY created_at LIMIT \
			 ?)",
		)
		.bind(n)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	// --- incidents ---

	/// The open incident for a test, if one exists.
	pub async fn active_incident_for(&self, test_id: &str) -> Result<Option<Incident>> {
		let row = sqlx::query_as::<_, IncidentRow>(
			"SELECT * FROM incidents WHERE active AND test_id = ?",
		)
		.bind(test_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(IncidentRow::into_incident))
	}

	/// Open a new incident and return its id.
	pub async fn open_incident(&self, test_id: &str, root_cause: &str) -> Result<i64> {
		let result = sqlx::query(
			"INSERT INTO incidents(test_id, active, root_cause, created_at) VALUES (?, 1, ?, ?)",
		)
		.bind(test_id)
		.bind(root_cause)
		.bind(Utc::now())
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	/// Close one incident.
	pub async fn close_incident(&self, incident_id: i64) -> Result<()> {
		sqlx::query("UPDATE incidents SET active = 0, closed_at = ? WHERE incident_id = ?")
			.bind(Utc::now())
			.bind(incident_id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	/// Close every incident belonging to a test (test deletion).
	pub async fn close_incidents_for_test(&self, test_id: &str) -> Result<()> {
		sqlx::query("UPDATE incidents SET active = 0, closed_at = ? WHERE test_id = ?")
			.bind(Utc::now())
			.bind(test_id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	/// Contacts already notified for an incident (the recovery set).
	pub async fn incident_contacts(&self, incident_id: i64) -> Result<Vec<Contact>> {
		let rows = sqlx::query_as::<_, ContactRow>(
			"SELECT c.contact_id, c.contact_name, c.contact_type, c.contact_url FROM \
			 incident_contact_log i INNER JOIN contacts c ON i.contact_id = c.contact_id WHERE \
			 i.incident_id = ?",
		)
		.bind(incident_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ContactRow::into_contact).collect()
	}

	/// Contacts whose consecutive-failure threshold has been crossed and who
	/// have not yet been notified for the active incident.
	///
	/// The failure window counts logs with status Error/TimedOut newer than
	/// the most recent non-failing log (Successful, Initialized, and Paused
	/// all reset the window), so the count survives restarts.
	pub async fn contacts_to_notify(&self, test_id: &str) -> Result<Vec<Contact>> {
		let rows = sqlx::query_as::<_, ContactRow>(
			"WITH _test AS (
			    SELECT ? AS test_id
			),
			_last_log AS (
			    SELECT created_at
			    FROM logs
			             INNER JOIN _test
			                        USING (test_id)
			    WHERE NOT (status_id = 2 OR status_id = 3)
			    ORDER BY created_at DESC
			    LIMIT 1
			),
			_failing_test AS (
			    SELECT test_id, count(*) fails
			    FROM logs
			             INNER JOIN _test
			                        USING (test_id)
			    WHERE (status_id = 2
			        OR status_id = 3)
			      AND created_at > (SELECT created_at FROM _last_log)
			    GROUP BY test_id
			),
			_contacts_notified AS (
			    SELECT test_id, icl.contact_id
			    FROM incidents
			             INNER JOIN incident_contact_log icl
			                        USING (incident_id)
			    WHERE active
			)
			SELECT c.contact_id, contact_name, contact_type, contact_url
			FROM test_contacts tc
			         INNER JOIN _failing_test f
			                    USING (test_id)
			         INNER JOIN contacts c
			                    USING (contact_id)
			WHERE f.fails >= tc.threshold
			  AND (tc.test_id, tc.contact_id) NOT IN (SELECT test_id, contact_id FROM \
			 _contacts_notified)",
		)
		.bind(test_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(ContactRow::into_contact).collect()
	}

	/// Record a delivered notification for an incident.
	pub async fn insert_incident_contact_log(
		&self,
		incident_id: i64,
		contact_id: &str,
		message: &str,
	) -> Result<()> {
		sqlx::query(
			"INSERT INTO incident_contact_log(incident_id, contact_id, message, created_at) \
			 VALUES (?, ?, ?, ?)",
		)
		.bind(incident_id)
		.bind(contact_id)
		.bind(message)
		.bind(Utc::now())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	// --- contacts ---

	/// All contacts.
	pub async fn list_contacts(&self) -> Result<Vec<Contact>> {
		let rows = sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts")
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(ContactRow::into_contact).collect()
	}

	/// A single contact by id.
	pub async fn get_contact(&self, contact_id: &str) -> Result<Contact> {
		sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE contact_id = ?")
			.bind(contact_id)
			.fetch_optional(&self.pool)
			.await?
			.ok_or(Error::NotFound)?
			.into_contact()
	}

	/// Insert a contact row.
	pub async fn insert_contact(&self, contact: &Contact) -> Result<()> {
		sqlx::query(
			"INSERT INTO contacts(contact_id, contact_name, contact_type, contact_url) VALUES (?, \
			 ?, ?, ?)",
		)
		.bind(&contact.contact_id)
		.bind(&contact.contact_name)
		.bind(contact_kind_name(contact.contact_type))
		.bind(&contact.contact_url)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Replace a contact row.
	pub async fn update_contact(&self, contact: &Contact) -> Result<()> {
		sqlx::query(
			"UPDATE contacts SET contact_name = ?, contact_type = ?, contact_url = ? WHERE \
			 contact_id = ?",
		)
		.bind(&contact.contact_name)
		.bind(contact_kind_name(contact.contact_type))
		.bind(&contact.contact_url)
		.bind(&contact.contact_id)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Remove a contact row.
	pub async fn delete_contact(&self, contact_id: &str) -> Result<()> {
		sqlx::query("DELETE FROM contacts WHERE contact_id = ?")
			.bind(contact_id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	/// Threshold edges configured for a test.
	pub async fn test_contacts_for(&self, test_id: &str) -> Result<Vec<TestContact>> {
		let rows = sqlx::query_as::<_, TestContactRow>(
			"SELECT * FROM test_contacts WHERE test_id = ?",
		)
		.bind(test_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(TestContactRow::into_edge).collect())
	}

	/// Subscribe a contact to a test with a failure threshold.
	pub async fn insert_test_contact(&self, edge: &TestContact) -> Result<()> {
		sqlx::query("INSERT INTO test_contacts(contact_id, test_id, threshold) VALUES (?, ?, ?)")
			.bind(&edge.contact_id)
			.bind(&edge.test_id)
			.bind(edge.threshold)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	/// Remove one subscription edge.
	pub async fn delete_test_contact(&self, test_id: &str, contact_id: &str) -> Result<()> {
		sqlx::query("DELETE FROM test_contacts WHERE contact_id = ? AND test_id = ?")
			.bind(contact_id)
			.bind(test_id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}
}

fn contact_kind_name(kind: ContactKind) -> &'static str {
	match kind {
		ContactKind::Smtp => "smtp",
		ContactKind::Http => "http",
	}
}

fn decode_spec(kind: &str, blob: &str) -> Result<TestSpec> {
	let params: serde_json::Value = if blob.is_empty() {
		serde_json::json!({})
	} else {
		serde_json::from_str(blob)?
	};
	let tagged = serde_json::json!({ "test_type": kind, "blob": params });

	Ok(serde_json::from_value(tagged)?)
}

fn encode_spec(spec: &TestSpec) -> Result<String> {
	let tagged = serde_json::to_value(spec)?;
	let blob = tagged.get("blob").cloned().unwrap_or_else(|| serde_json::json!({}));

	Ok(serde_json::to_string(&blob)?)
}

#[derive(FromRow)]
struct TestRow {
	test_id: String,
	test_name: String,
	test_type: String,
	url: String,
	interval: i64,
	timeout: i64,
	created_at: DateTime<Utc>,
	active: bool,
	blob: Option<String>,
}
impl TestRow {
	fn into_test(self) -> Result<Test> {
		let spec = decode_spec(&self.test_type, self.blob.as_deref().unwrap_or_default())?;

		Ok(Test {
			test_id: self.test_id,
			test_name: self.test_name,
			url: self.url,
			interval: Duration::from_secs(self.interval.max(0) as u64),
			timeout: Duration::from_secs(self.timeout.max(0) as u64),
			created_at: self.created_at,
			active: self.active,
			spec,
		})
	}
}

#[derive(FromRow)]
struct LogRow {
	log_id: i64,
	test_id: String,
	status_id: i64,
	message: Option<String>,
	response_time: i64,
	created_at: DateTime<Utc>,
}
impl LogRow {
	fn into_log(self) -> Result<LogEntry> {
		let status = Status::from_id(self.status_id).ok_or(Error::Validation {
			field: "status_id",
			reason: format!("Unknown status id {}.", self.status_id),
		})?;

		Ok(LogEntry {
			log_id: self.log_id,
			test_id: self.test_id,
			status,
			message: self.message.unwrap_or_default(),
			response_time: Duration::from_millis(self.response_time.max(0) as u64),
			created_at: self.created_at,
		})
	}
}

#[derive(FromRow)]
struct IncidentRow {
	incident_id: i64,
	test_id: String,
	active: bool,
	root_cause: String,
	created_at: DateTime<Utc>,
	closed_at: Option<DateTime<Utc>>,
}
impl IncidentRow {
	fn into_incident(self) -> Incident {
		Incident {
			incident_id: self.incident_id,
			test_id: self.test_id,
			active: self.active,
			root_cause: self.root_cause,
			created_at: self.created_at,
			closed_at: self.closed_at,
		}
	}
}

#[derive(FromRow)]
struct ContactRow {
	contact_id: String,
	contact_name: String,
	contact_type: String,
	contact_url: String,
}
impl ContactRow {
	fn into_contact(self) -> Result<Contact> {
		let contact_type = match self.contact_type.as_str() {
			"smtp" => ContactKind::Smtp,
			"http" => ContactKind::Http,
			other => {
				return Err(Error::Validation {
					field: "contact_type",
					reason: format!("Unknown contact type '{other}'."),
				});
			},
		};

		Ok(Contact {
			contact_id: self.contact_id,
			contact_name: self.contact_name,
			contact_type,
			contact_url: self.contact_url,
		})
	}
}

#[derive(FromRow)]
struct TestContactRow {
	test_id: String,
	contact_id: String,
	threshold: u32,
}
impl TestContactRow {
	fn into_edge(self) -> TestContact {
		TestContact {
			test_id: self.test_id,
			contact_id: self.contact_id,
			threshold: self.threshold,
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// crates.io
	use chrono::TimeDelta;
	// self
	use super::*;
	use crate::model::{HttpMethod, HttpSpec};

	fn sample_test(id: &str) -> Test {
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

	fn sample_contact(id: &str, kind: ContactKind) -> Contact {
		Contact {
			contact_id: id.into(),
			contact_name: format!("contact {id}"),
			contact_type: kind,
			contact_url: match kind {
				ContactKind::Smtp => "ops@example.com".into(),
				ContactKind::Http => "https://hooks.example.com/alerts".into(),
			},
		}
	}

	async fn log_at(store: &Store, test_id: &str, status: Status, offset_secs: i64) {
		let at = Utc::now() + TimeDelta::seconds(offset_secs);

		store
			.insert_log(test_id, status, "", Duration::from_millis(12), at)
			.await
			.expect("insert log");
	}

	#[tokio::test]
	async fn fresh_files_migrate_and_reopen_without_remigrating() {
		let dir = tempfile::tempdir().expect("tempdir");
		let path = dir.path().join("pingr.sqlite");

		{
			let store = Store::open(&path, false).await.expect("open fresh");

			store.insert_test(&sample_test("t1")).await.expect("insert");
		}

		// An existing file skips migration unless forced; the data survives.
		let store = Store::open(&path, false).await.expect("reopen");

		assert_eq!(store.list_tests().await.expect("list").len(), 1);
	}

	#[tokio::test]
	async fn tests_round_trip_including_the_blob() {
		let store = Store::open_in_memory().await.expect("store");
		let test = sample_test("t1");

		store.insert_test(&test).await.expect("insert");

		let loaded = store.get_test("t1").await.expect("get");

		assert_eq!(loaded.test_name, test.test_name);
		assert_eq!(loaded.spec, test.spec);
		assert_eq!(loaded.interval, test.interval);

		let active = store.list_active_tests().await.expect("list");

		assert_eq!(active.len(), 1);

		store.set_active("t1", false).await.expect("deactivate");
		assert!(store.list_active_tests().await.expect("list").is_empty());
	}

	#[tokio::test]
	async fn missing_test_reports_not_found() {
		let store = Store::open_in_memory().await.expect("store");

		assert!(matches!(store.get_test("nope").await, Err(Error::NotFound)));
	}

	#[tokio::test]
	async fn latest_log_orders_by_created_at() {
		let store = Store::open_in_memory().await.expect("store");

		store.insert_test(&sample_test("t1")).await.expect("insert");
		log_at(&store, "t1", Status::Initialized, 0).await;
		log_at(&store, "t1", Status::Successful, 1).await;
		log_at(&store, "t1", Status::Error, 2).await;

		let latest = store.latest_test_log("t1").await.expect("latest").expect("some");

		assert_eq!(latest.status, Status::Error);

		let limited = store.list_test_logs_limited("t1", 2).await.expect("limited");

		assert_eq!(limited.len(), 2);
		assert_eq!(limited[0].status, Status::Error);
	}

	#[tokio::test]
	async fn threshold_window_counts_failures_since_last_non_failure() {
		let store = Store::open_in_memory().await.expect("store");

		store.insert_test(&sample_test("t1")).await.expect("insert");
		store.insert_contact(&sample_contact("c-a", ContactKind::Smtp)).await.expect("contact");
		store.insert_contact(&sample_contact("c-b", ContactKind::Http)).await.expect("contact");
		store
			.insert_test_contact(&TestContact {
				test_id: "t1".into(),
				contact_id: "c-a".into(),
				threshold: 2,
			})
			.await
			.expect("edge");
		store
			.insert_test_contact(&TestContact {
				test_id: "t1".into(),
				contact_id: "c-b".into(),
				threshold: 3,
			})
			.await
			.expect("edge");

		log_at(&store, "t1", Status::Initialized, 0).await;
		log_at(&store, "t1", Status::Error, 1).await;

		// One failure: no threshold crossed yet.
		assert!(store.contacts_to_notify("t1").await.expect("query").is_empty());

		log_at(&store, "t1", Status::Error, 2).await;

		let crossed = store.contacts_to_notify("t1").await.expect("query");

		assert_eq!(crossed.len(), 1);
		assert_eq!(crossed[0].contact_id, "c-a");

		// Once recorded in the incident contact log, c-a drops out while
		// c-b crosses its threshold on the next failure.
		let incident_id = store.open_incident("t1", "boom").await.expect("incident");

		store.insert_incident_contact_log(incident_id, "c-a", "boom").await.expect("icl");
		log_at(&store, "t1", Status::TimedOut, 3).await;

		let crossed = store.contacts_to_notify("t1").await.expect("query");

		assert_eq!(crossed.len(), 1);
		assert_eq!(crossed[0].contact_id, "c-b");

		// A success resets the window entirely.
		log_at(&store, "t1", Status::Successful, 4).await;
		assert!(store.contacts_to_notify("t1").await.expect("query").is_empty());
	}

	#[tokio::test]
	async fn incidents_open_and_close() {
		let store = Store::open_in_memory().await.expect("store");

		store.insert_test(&sample_test("t1")).await.expect("insert");

		assert!(store.active_incident_for("t1").await.expect("query").is_none());

		let incident_id = store.open_incident("t1", "connection refused").await.expect("open");
		let incident =
			store.active_incident_for("t1").await.expect("query").expect("active incident");

		assert_eq!(incident.incident_id, incident_id);
		assert_eq!(incident.root_cause, "connection refused");
		assert!(incident.closed_at.is_none());

		store.close_incident(incident_id).await.expect("close");
		assert!(store.active_incident_for("t1").await.expect("query").is_none());
	}

	#[tokio::test]
	async fn incident_contacts_lists_the_notified_set() {
		let store = Store::open_in_memory().await.expect("store");

		store.insert_test(&sample_test("t1")).await.expect("insert");
		store.insert_contact(&sample_contact("c-a", ContactKind::Smtp)).await.expect("contact");

		let incident_id = store.open_incident("t1", "boom").await.expect("open");

		store.insert_incident_contact_log(incident_id, "c-a", "boom").await.expect("icl");

		let notified = store.incident_contacts(incident_id).await.expect("query");

		assert_eq!(notified.len(), 1);
		assert_eq!(notified[0].contact_id, "c-a");
	}

	#[tokio::test]
	async fn oldest_logs_are_trimmed_first() {
		let store = Store::open_in_memory().await.expect("store");

		store.insert_test(&sample_test("t1")).await.expect("insert");

		for i in 0..5 {
			log_at(&store, "t1", Status::Successful, i).await;
		}

		let removed = store.delete_oldest_logs(3).await.expect("trim");

		assert_eq!(removed, 3);

		let remaining = store.list_test_logs("t1").await.expect("list");

		assert_eq!(remaining.len(), 2);
	}
}
