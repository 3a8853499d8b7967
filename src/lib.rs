//! Self-hosted synthetic monitoring: periodic active probes, push
//! endpoints, incident tracking, and contact notifications — built on
//! tokio.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod alert;
pub mod bus;
pub mod config;
pub mod logging;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod probe;
pub mod scheduler;
pub mod secret;
pub mod serve;
pub mod store;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
pub use crate::{
	alert::AlertPolicy,
	bus::Bus,
	config::{Config, ConfigHandle},
	error::{Error, Result},
	model::{Contact, ContactKind, Incident, LogEntry, Status, Test, TestContact, TestSpec},
	notify::Notifier,
	probe::ProbeContext,
	scheduler::Scheduler,
	secret::{SealKey, SealedSecret},
	store::Store,
};

#[cfg(test)]
mod _test {
	use tempfile as _;
	use wiremock as _;
}
