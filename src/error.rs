//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the probe engine.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Email(#[from] lettre::error::Error),
	#[error(transparent)]
	Ping(#[from] surge_ping::SurgeError),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Resolve(#[from] hickory_resolver::error::ResolveError),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Smtp(#[from] lettre::transport::smtp::Error),
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Ssh(#[from] russh::Error),
	#[error(transparent)]
	SshKey(#[from] russh_keys::Error),
	#[error(transparent)]
	Template(#[from] minijinja::Error),

	#[error("Authentication rejected: {0}")]
	Auth(String),
	#[error("Probe outcome discarded after cancellation.")]
	Cancelled,
	#[error("Configuration error for {field}: {reason}")]
	Config { field: &'static str, reason: String },
	#[error("Notification dispatch failed: {0}")]
	Dispatch(String),
	#[error("TLS handshake failed: {0}")]
	Handshake(String),
	#[error("Row not found.")]
	NotFound,
	#[error("Protocol check failed: {0}")]
	Protocol(String),
	#[error("No payload received before the deadline.")]
	PushTimedOut,
	#[error("Push bus publish dropped, slot occupied.")]
	QueueFull,
	#[error("Probe timed out after {after_secs} s.")]
	TimedOut { after_secs: u64 },
	#[error("Push bus topic is closed.")]
	TopicClosed,
	#[error("Could not unseal credential: {0}")]
	Unsealing(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
	#[error("Certificate verification failed: {0}")]
	Verification(String),
}
impl Error {
	/// Whether this failure should be logged as `TimedOut` rather than `Error`.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::TimedOut { .. } | Self::PushTimedOut)
	}
}
