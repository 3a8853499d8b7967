//! Environment-driven configuration.
//!
//! Parsing failures for mandatory settings abort the process before the
//! scheduler starts. `SIGHUP` re-reads the environment and swaps the
//! snapshot behind [`ConfigHandle`]; components read fresh snapshots per
//! use, so a reload applies without restarting workers.

// std
use std::{env, path::PathBuf, sync::RwLock};
// self
use crate::{_prelude::*, secret::SealKey};

/// Default SQLite file name next to the working directory.
pub const DEFAULT_SQLITE_PATH: &str = "pingr.sqlite";
/// Default free-space floor in GiB before log trimming kicks in.
pub const DEFAULT_MIN_DISC_STORAGE_GIB: u64 = 5;

/// Immutable configuration snapshot.
#[derive(Clone, Debug)]
pub struct Config {
	/// Development mode: disables startup jitter and enables debug logs.
	pub dev: bool,
	/// External base URL used to build links in notification emails.
	pub base_url: String,
	/// Listen port for the push HTTP surface.
	pub port: u16,
	/// SQLite database file.
	pub sqlite_path: PathBuf,
	/// Force schema migration even on an existing database file.
	pub sqlite_migrate: bool,
	/// Basic-auth user for the admin surface.
	pub basic_auth_user: String,
	/// Basic-auth password for the admin surface.
	pub basic_auth_pass: String,
	/// Grace period allowed for shutdown after SIGINT/SIGTERM.
	pub term_duration: Duration,
	/// SMTP relay host.
	pub smtp_host: String,
	/// SMTP relay port.
	pub smtp_port: u16,
	/// SMTP username, also the sender address.
	pub smtp_username: String,
	/// SMTP password.
	pub smtp_password: String,
	/// Key material sealing SSH credentials at rest.
	pub seal_key: SealKey,
	/// Free-space floor in GiB for the disk maintainer.
	pub min_disc_storage_gib: u64,
}
impl Config {
	/// Parse configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		let dev = parse_bool("DEV", var("DEV").as_deref(), true)?;
		let port = parse_u16("PORT", var("PORT").as_deref(), 8_080)?;
		let base_url = match var("BASE_URL") {
			Some(url) => url,
			None if dev => format!("http://localhost:{port}"),
			None =>
				return Err(Error::Config { field: "BASE_URL", reason: "Must be set.".into() }),
		};

		url::Url::parse(&base_url).map_err(|err| Error::Config {
			field: "BASE_URL",
			reason: format!("Invalid URL: {err}."),
		})?;

		let basic_auth_user = required_unless_dev("BASIC_AUTH_USER", dev, "admin")?;
		let basic_auth_pass = required_unless_dev("BASIC_AUTH_PASS", dev, "admin")?;
		let seal_key = match var("AES_KEY") {
			Some(hexed) => SealKey::from_hex(&hexed)?,
			None => return Err(Error::Config { field: "AES_KEY", reason: "Must be set.".into() }),
		};

		Ok(Self {
			dev,
			base_url,
			port,
			sqlite_path: PathBuf::from(
				var("SQLITE_PATH").unwrap_or_else(|| DEFAULT_SQLITE_PATH.into()),
			),
			sqlite_migrate: parse_bool("SQLITE_MIGRATE", var("SQLITE_MIGRATE").as_deref(), false)?,
			basic_auth_user,
			basic_auth_pass,
			term_duration: parse_duration(
				"TERM_DURATION",
				var("TERM_DURATION").as_deref(),
				Duration::from_secs(20),
			)?,
			smtp_host: var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".into()),
			smtp_port: parse_u16("SMTP_PORT", var("SMTP_PORT").as_deref(), 587)?,
			smtp_username: var("SMTP_USERNAME").unwrap_or_default(),
			smtp_password: var("SMTP_PASSWORD").unwrap_or_default(),
			seal_key,
			min_disc_storage_gib: parse_u64(
				"MIN_DISC_STORAGE",
				var("MIN_DISC_STORAGE").as_deref(),
				DEFAULT_MIN_DISC_STORAGE_GIB,
			)?,
		})
	}
}

/// Shared configuration that survives SIGHUP reloads.
#[derive(Clone, Debug)]
pub struct ConfigHandle {
	inner: Arc<RwLock<Config>>,
}
impl ConfigHandle {
	/// Wrap an initial snapshot.
	pub fn new(config: Config) -> Self {
		Self { inner: Arc::new(RwLock::new(config)) }
	}

	/// Clone the current snapshot.
	pub fn snapshot(&self) -> Config {
		self.inner.read().expect("config lock poisoned").clone()
	}

	/// Re-read the environment and swap the snapshot on success.
	pub fn reload(&self) -> Result<()> {
		let fresh = Config::from_env()?;

		*self.inner.write().expect("config lock poisoned") = fresh;

		Ok(())
	}
}

fn var(name: &str) -> Option<String> {
	env::var(name).ok().filter(|value| !value.is_empty())
}

fn required_unless_dev(name: &'static str, dev: bool, fallback: &str) -> Result<String> {
	match var(name) {
		Some(value) => Ok(value),
		None if dev => Ok(fallback.into()),
		None => Err(Error::Config { field: name, reason: "Must be set.".into() }),
	}
}

fn parse_bool(name: &'static str, value: Option<&str>, default: bool) -> Result<bool> {
	match value {
		None => Ok(default),
		Some("true") | Some("1") => Ok(true),
		Some("false") | Some("0") => Ok(false),
		Some(other) => Err(Error::Config {
			field: name,
			reason: format!("Expected true/false, got '{other}'."),
		}),
	}
}

fn parse_u16(name: &'static str, value: Option<&str>, default: u16) -> Result<u16> {
	value.map_or(Ok(default), |raw| {
		raw.parse().map_err(|err| Error::Config {
			field: name,
			reason: format!("Invalid number '{raw}': {err}."),
		})
	})
}

fn parse_u64(name: &'static str, value: Option<&str>, default: u64) -> Result<u64> {
	value.map_or(Ok(default), |raw| {
		raw.parse().map_err(|err| Error::Config {
			field: name,
			reason: format!("Invalid number '{raw}': {err}."),
		})
	})
}

// Accepts `90`, `90s`, `5m`, or `2h`.
fn parse_duration(name: &'static str, value: Option<&str>, default: Duration) -> Result<Duration> {
	let Some(raw) = value else { return Ok(default) };
	let raw = raw.trim();
	let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
		Some(index) => raw.split_at(index),
		None => (raw, "s"),
	};
	let count: u64 = digits.parse().map_err(|err| Error::Config {
		field: name,
		reason: format!("Invalid duration '{raw}': {err}."),
	})?;

	match unit {
		"s" => Ok(Duration::from_secs(count)),
		"m" => Ok(Duration::from_secs(count * 60)),
		"h" => Ok(Duration::from_secs(count * 3_600)),
		other => Err(Error::Config {
			field: name,
			reason: format!("Unknown duration unit '{other}'."),
		}),
	}
}
