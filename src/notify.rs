//! Notification sinks: themed email over SMTP and JSON webhooks.

pub mod email;
pub mod webhook;

// crates.io
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	config::ConfigHandle,
	model::{Contact, ContactKind, Status, Test},
	store::Store,
};

/// What a notification is about.
#[derive(Clone, Copy, Debug)]
pub enum Notice<'a> {
	/// The test is failing with the given outcome.
	Failure {
		/// Failing log status (`Error` or `TimedOut`).
		status: Status,
		/// Error message delivered to the contact.
		message: &'a str,
	},
	/// The test has recovered.
	Recovery,
}
impl Notice<'_> {
	/// Status recorded for this notice.
	pub fn status(&self) -> Status {
		match self {
			Self::Failure { status, .. } => *status,
			Self::Recovery => Status::Successful,
		}
	}

	/// Message carried by this notice, empty on recovery.
	pub fn message(&self) -> &str {
		match self {
			Self::Failure { message, .. } => message,
			Self::Recovery => "",
		}
	}
}

/// Dispatches notices to contacts over the channel their kind selects.
#[derive(Clone, Debug)]
pub struct Notifier {
	config: ConfigHandle,
	store: Store,
	client: Client,
}
impl Notifier {
	/// Build a notifier sharing the engine's HTTP client.
	pub fn new(config: ConfigHandle, store: Store, client: Client) -> Self {
		Self { config, store, client }
	}

	/// Deliver one notice to one contact; any failure surfaces as a
	/// dispatch error and leaves incident state untouched.
	pub async fn dispatch(&self, contact: &Contact, test: &Test, notice: Notice<'_>) -> Result<()> {
		tracing::debug!(
			contact = %contact.contact_id,
			test = %test.test_id,
			status = notice.status().name(),
			"dispatching notification"
		);

		match contact.contact_type {
			ContactKind::Smtp => {
				let config = self.config.snapshot();

				email::send(&config, &self.store, &contact.contact_url, test, notice).await
			},
			ContactKind::Http =>
				webhook::send(&self.client, &contact.contact_url, test, notice).await,
		}
	}
}
