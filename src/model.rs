//! Test definitions, outcome logs, contacts, incidents, and their validation.
//!
//! A [`Test`] is the unit of scheduling: base fields shared by every kind plus
//! a kind-specific parameter bag ([`TestSpec`]) that is persisted as an opaque
//! JSON blob and dispatched on the `test_type` column.

// std
use std::collections::HashMap;
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, secret::SealedSecret};

/// Outcome classes recorded in the log table, ids matching the seeded
/// `status_map` rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
	/// Probe attempt completed without error.
	Successful,
	/// Probe attempt failed.
	Error,
	/// Probe attempt exceeded its deadline.
	TimedOut,
	/// Worker installed and about to run its first attempt.
	Initialized,
	/// Test deactivated by the operator.
	Paused,
}
impl Status {
	/// Numeric id as stored in `logs.status_id`.
	pub fn id(self) -> i64 {
		match self {
			Self::Successful => 1,
			Self::Error => 2,
			Self::TimedOut => 3,
			Self::Initialized => 5,
			Self::Paused => 6,
		}
	}

	/// Resolve a persisted id back to a status.
	pub fn from_id(id: i64) -> Option<Self> {
		match id {
			1 => Some(Self::Successful),
			2 => Some(Self::Error),
			3 => Some(Self::TimedOut),
			5 => Some(Self::Initialized),
			6 => Some(Self::Paused),
			_ => None,
		}
	}

	/// Human name as seeded in `status_map`.
	pub fn name(self) -> &'static str {
		match self {
			Self::Successful => "Successful",
			Self::Error => "Error",
			Self::TimedOut => "TimedOut",
			Self::Initialized => "Initialized",
			Self::Paused => "Paused",
		}
	}

	/// Whether a log entry with this status counts towards contact thresholds.
	pub fn is_failure(self) -> bool {
		matches!(self, Self::Error | Self::TimedOut)
	}
}

/// Serde helpers persisting [`Duration`] fields as whole seconds.
///
/// Tests created before the engine fixed its unit handling carry raw
/// integers; those are read as seconds.
pub mod duration_secs {
	use super::*;
	use serde::{Deserializer, Serializer, de::Deserialize};

	/// Serialize a duration as its whole-second count.
	pub fn serialize<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(value.as_secs())
	}

	/// Deserialize a whole-second count into a duration.
	pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = u64::deserialize(deserializer)?;

		Ok(Duration::from_secs(secs))
	}
}

/// One scheduled check: base fields plus kind-specific parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Test {
	/// Opaque unique identifier.
	pub test_id: String,
	/// Human-readable display name.
	pub test_name: String,
	/// Target URL or host; empty for push kinds.
	#[serde(default)]
	pub url: String,
	/// Period between completions of consecutive attempts; zero for push kinds.
	#[serde(with = "duration_secs")]
	pub interval: Duration,
	/// Per-attempt deadline.
	#[serde(with = "duration_secs")]
	pub timeout: Duration,
	/// Creation timestamp.
	pub created_at: DateTime<Utc>,
	/// Whether the scheduler should run this test.
	pub active: bool,
	/// Kind-specific parameters, dispatched on `test_type`.
	#[serde(flatten)]
	pub spec: TestSpec,
}
impl Test {
	/// Bus topic carrying inbound push payloads for this test.
	pub fn push_topic(&self) -> String {
		format!("push:{}", self.test_id)
	}

	/// Validate base and kind-specific invariants.
	pub fn validate(&self) -> Result<()> {
		if self.test_id.is_empty() {
			return Err(Error::Validation { field: "test_id", reason: "Must not be empty.".into() });
		}
		if self.test_name.is_empty() {
			return Err(Error::Validation {
				field: "test_name",
				reason: "Must not be empty.".into(),
			});
		}
		if self.timeout.is_zero() {
			return Err(Error::Validation {
				field: "timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		if self.spec.is_push() {
			if !self.interval.is_zero() {
				return Err(Error::Validation {
					field: "interval",
					reason: "Must be zero for push kinds.".into(),
				});
			}
		} else {
			if self.interval.is_zero() {
				return Err(Error::Validation {
					field: "interval",
					reason: "Must be greater than zero for poll kinds.".into(),
				});
			}
			if self.url.is_empty() {
				return Err(Error::Validation {
					field: "url",
					reason: "Must not be empty for poll kinds.".into(),
				});
			}
		}

		self.spec.validate()
	}
}

/// Kind-specific test parameters; the serialized form carries the kind in
/// `test_type` and the parameters in `blob`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test_type", content = "blob")]
pub enum TestSpec {
	/// HTTP request with optional expectations on status, headers, and body.
	#[serde(rename = "HTTP")]
	Http(HttpSpec),
	/// Prometheus exposition scrape evaluated against metric bounds.
	#[serde(rename = "Prometheus")]
	Prometheus(PrometheusSpec),
	/// TLS handshake with cipher, validity, and revocation checks.
	#[serde(rename = "TLS")]
	Tls(TlsSpec),
	/// DNS lookup compared against an expected record set.
	#[serde(rename = "DNS")]
	Dns(DnsSpec),
	/// ICMP echo.
	#[serde(rename = "Ping")]
	Ping(PingSpec),
	/// SSH dial + authentication + session open.
	#[serde(rename = "SSH")]
	Ssh(SshSpec),
	/// TCP resolve + dial.
	#[serde(rename = "TCP")]
	Tcp(TcpSpec),
	/// Passive test fed by inbound HTTP pushes.
	#[serde(rename = "HTTPPush")]
	HttpPush(HttpPushSpec),
	/// Passive test whose pushed payload is Prometheus exposition text.
	#[serde(rename = "PrometheusPush")]
	PrometheusPush(PrometheusPushSpec),
}
impl TestSpec {
	/// The `test_type` discriminant as persisted and published.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Http(_) => "HTTP",
			Self::Prometheus(_) => "Prometheus",
			Self::Tls(_) => "TLS",
			Self::Dns(_) => "DNS",
			Self::Ping(_) => "Ping",
			Self::Ssh(_) => "SSH",
			Self::Tcp(_) => "TCP",
			Self::HttpPush(_) => "HTTPPush",
			Self::PrometheusPush(_) => "PrometheusPush",
		}
	}

	/// Whether this kind waits for inbound payloads instead of polling.
	pub fn is_push(&self) -> bool {
		matches!(self, Self::HttpPush(_) | Self::PrometheusPush(_))
	}

	/// Validate kind-specific invariants.
	pub fn validate(&self) -> Result<()> {
		match self {
			Self::Ssh(spec) => spec.validate(),
			Self::Dns(spec) => spec.validate(),
			Self::Prometheus(PrometheusSpec { metric_tests })
			| Self::PrometheusPush(PrometheusPushSpec { metric_tests }) => {
				if metric_tests.is_empty() {
					return Err(Error::Validation {
						field: "metric_tests",
						reason: "Must contain at least one metric test.".into(),
					});
				}

				metric_tests.iter().try_for_each(MetricTest::validate)
			},
			_ => Ok(()),
		}
	}
}

/// HTTP methods the HTTP probe may issue.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	Get,
	Post,
	Put,
	Head,
	Delete,
}
impl HttpMethod {
	/// Map onto the reqwest method type.
	pub fn as_reqwest(self) -> reqwest::Method {
		match self {
			Self::Get => reqwest::Method::GET,
			Self::Post => reqwest::Method::POST,
			Self::Put => reqwest::Method::PUT,
			Self::Head => reqwest::Method::HEAD,
			Self::Delete => reqwest::Method::DELETE,
		}
	}
}

/// Parameters for the HTTP probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpSpec {
	/// Method to issue.
	pub method: HttpMethod,
	/// Request headers to set.
	#[serde(default)]
	pub req_headers: HashMap<String, String>,
	/// Request body to send.
	#[serde(default)]
	pub req_body: String,
	/// Expected response status; zero accepts any status.
	#[serde(default)]
	pub res_status: u16,
	/// Response headers that must match exactly.
	#[serde(default)]
	pub res_headers: HashMap<String, String>,
	/// Expected response body; empty skips the comparison.
	#[serde(default)]
	pub res_body: String,
}

/// Parameters for the TCP probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TcpSpec {
	/// Port to dial on the target host.
	pub port: u16,
}

/// Parameters for the TLS probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TlsSpec {
	/// Port to dial on the target host.
	pub port: u16,
}

/// Parameters for the ICMP probe.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PingSpec {}

/// Parameters for the SSH probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SshSpec {
	/// Account to authenticate as.
	pub username: String,
	/// Port to dial on the target host.
	pub port: u16,
	/// When true the credential is a PEM private key, otherwise a password.
	#[serde(default)]
	pub use_key_pair: bool,
	/// Sealed password or private key; the plaintext never leaves the probe.
	pub credential: SealedSecret,
	/// Optional sealed passphrase protecting the private key.
	#[serde(default)]
	pub passphrase: Option<SealedSecret>,
}
impl SshSpec {
	fn validate(&self) -> Result<()> {
		if self.username.is_empty() {
			return Err(Error::Validation { field: "username", reason: "Must not be empty.".into() });
		}
		if self.port == 0 {
			return Err(Error::Validation { field: "port", reason: "Must not be zero.".into() });
		}
		if self.credential.is_empty() {
			return Err(Error::Validation {
				field: "credential",
				reason: "A sealed password or private key is required.".into(),
			});
		}

		Ok(())
	}
}

/// DNS record kinds the DNS probe can query.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
	A,
	Cname,
	Txt,
	Mx,
	Ns,
}

/// How the looked-up record set is compared against the configured values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
	/// Both sets must be equal.
	Exact,
	/// Every configured value must appear in the lookup result.
	CheckIsSubset,
	/// Every lookup result must appear among the configured values.
	DnsIsSubset,
	/// The sets must share at least one value.
	Intersects,
}

/// Parameters for the DNS probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DnsSpec {
	/// Record kind to look up.
	pub record: RecordKind,
	/// Comparison strategy.
	pub strategy: MatchStrategy,
	/// Values compared against the lookup result.
	pub check: Vec<String>,
}
impl DnsSpec {
	fn validate(&self) -> Result<()> {
		if self.check.is_empty() {
			return Err(Error::Validation {
				field: "check",
				reason: "Must contain at least one value.".into(),
			});
		}

		Ok(())
	}
}

/// Bounds applied to one scraped metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricTest {
	/// Metric family name.
	pub key: String,
	/// Inclusive lower bound on the gauge value or counter increment.
	pub lower_bound: f64,
	/// Inclusive upper bound on the gauge value or counter increment.
	pub upper_bound: f64,
	/// Labels a sample must carry (superset match).
	#[serde(default)]
	pub labels: HashMap<String, String>,
}
impl MetricTest {
	/// Validate bound ordering and the family name.
	pub fn validate(&self) -> Result<()> {
		if self.key.is_empty() {
			return Err(Error::Validation { field: "key", reason: "Must not be empty.".into() });
		}
		if self.lower_bound > self.upper_bound {
			return Err(Error::Validation {
				field: "lower_bound",
				reason: "Must not exceed upper_bound.".into(),
			});
		}

		Ok(())
	}
}

/// Parameters for the Prometheus scrape probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrometheusSpec {
	/// Metric bounds evaluated against each scrape.
	pub metric_tests: Vec<MetricTest>,
}

/// Parameters for the HTTP push test.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpPushSpec {}

/// Parameters for the Prometheus push test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrometheusPushSpec {
	/// Metric bounds evaluated against each pushed payload.
	pub metric_tests: Vec<MetricTest>,
}

/// Serde helpers persisting [`Duration`] fields as whole milliseconds
/// (response times need sub-second resolution).
pub mod duration_millis {
	use super::*;
	use serde::{Deserializer, Serializer, de::Deserialize};

	/// Serialize a duration as its whole-millisecond count.
	pub fn serialize<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(value.as_millis() as u64)
	}

	/// Deserialize a whole-millisecond count into a duration.
	pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let millis = u64::deserialize(deserializer)?;

		Ok(Duration::from_millis(millis))
	}
}

/// One recorded probe outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	/// Monotonic row id.
	pub log_id: i64,
	/// Test this outcome belongs to.
	pub test_id: String,
	/// Outcome class.
	pub status: Status,
	/// Optional human message, usually the error text.
	#[serde(default)]
	pub message: String,
	/// Observed response time.
	#[serde(with = "duration_millis")]
	pub response_time: Duration,
	/// When the outcome was recorded.
	pub created_at: DateTime<Utc>,
}

/// Notification destination kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
	/// Email over SMTP.
	Smtp,
	/// JSON webhook POST.
	Http,
}

/// A notification destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
	/// Opaque unique identifier.
	pub contact_id: String,
	/// Display name.
	pub contact_name: String,
	/// Delivery channel.
	pub contact_type: ContactKind,
	/// Email address or webhook URL.
	pub contact_url: String,
}
impl Contact {
	/// Validate required fields.
	pub fn validate(&self) -> Result<()> {
		if self.contact_id.is_empty() {
			return Err(Error::Validation {
				field: "contact_id",
				reason: "Must not be empty.".into(),
			});
		}
		if self.contact_name.is_empty() {
			return Err(Error::Validation {
				field: "contact_name",
				reason: "Must not be empty.".into(),
			});
		}
		if self.contact_url.is_empty() {
			return Err(Error::Validation {
				field: "contact_url",
				reason: "Must not be empty.".into(),
			});
		}

		Ok(())
	}
}

/// Subscription edge between a test and a contact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestContact {
	/// Subscribed test.
	pub test_id: String,
	/// Contact to notify.
	pub contact_id: String,
	/// Consecutive failing logs required before this contact is notified.
	pub threshold: u32,
}
impl TestContact {
	/// Validate the edge.
	pub fn validate(&self) -> Result<()> {
		if self.test_id.is_empty() {
			return Err(Error::Validation { field: "test_id", reason: "Must not be empty.".into() });
		}
		if self.contact_id.is_empty() {
			return Err(Error::Validation {
				field: "contact_id",
				reason: "Must not be empty.".into(),
			});
		}
		if self.threshold == 0 {
			return Err(Error::Validation {
				field: "threshold",
				reason: "Must be at least one.".into(),
			});
		}

		Ok(())
	}
}

/// A contiguous failing period for one test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Incident {
	/// Monotonic row id.
	pub incident_id: i64,
	/// Failing test.
	pub test_id: String,
	/// Whether the incident is still open.
	pub active: bool,
	/// Error message observed when the incident opened.
	pub root_cause: String,
	/// Opening timestamp.
	pub created_at: DateTime<Utc>,
	/// Closing timestamp once resolved.
	pub closed_at: Option<DateTime<Utc>>,
}

/// Record of one notification sent for an incident; membership doubles as
/// the "already notified" set consulted on recovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentContactLog {
	/// Incident the notification belongs to.
	pub incident_id: i64,
	/// Contact that was notified.
	pub contact_id: String,
	/// Message delivered.
	pub message: String,
	/// Dispatch timestamp.
	pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn http_test() -> Test {
		Test {
			test_id: "t1".into(),
			test_name: "front page".into(),
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

	#[test]
	fn test_round_trips_through_json() {
		let test = http_test();
		let encoded = serde_json::to_string(&test).expect("encode");
		let decoded: Test = serde_json::from_str(&encoded).expect("decode");

		assert_eq!(test, decoded);
		assert!(encoded.contains("\"test_type\":\"HTTP\""));
		assert!(encoded.contains("\"blob\""));
	}

	#[test]
	fn poll_test_requires_interval_and_url() {
		let mut test = http_test();

		test.interval = Duration::ZERO;
		assert!(test.validate().is_err());

		test.interval = Duration::from_secs(60);
		test.url = String::new();
		assert!(test.validate().is_err());
	}

	#[test]
	fn push_test_requires_zero_interval() {
		let mut test = http_test();

		test.spec = TestSpec::HttpPush(HttpPushSpec::default());
		test.url = String::new();
		assert!(test.validate().is_err());

		test.interval = Duration::ZERO;
		assert!(test.validate().is_ok());
	}

	#[test]
	fn metric_test_bounds_are_ordered() {
		let metric = MetricTest {
			key: "up".into(),
			lower_bound: 2.,
			upper_bound: 1.,
			labels: HashMap::new(),
		};

		assert!(metric.validate().is_err());
	}

	#[test]
	fn push_topic_embeds_the_test_id() {
		assert_eq!(http_test().push_topic(), "push:t1");
	}
}
