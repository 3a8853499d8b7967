//! Incident lifecycle and notification policy.
//!
//! Invoked by the scheduler on every probe outcome, after the outcome's log
//! entry has been written. Opens at most one incident per test, notifies
//! each subscribed contact at most once per incident (threshold permitting),
//! and closes the incident only after every already-notified contact has
//! been told of the recovery.

// self
use crate::{
	_prelude::*,
	model::{Status, Test},
	notify::{Notice, Notifier},
	store::Store,
};

/// Per-test failure state machine driver.
#[derive(Clone, Debug)]
pub struct AlertPolicy {
	store: Store,
	notifier: Notifier,
}
impl AlertPolicy {
	/// Wire the policy to its store and sinks.
	pub fn new(store: Store, notifier: Notifier) -> Self {
		Self { store, notifier }
	}

	/// Process one probe outcome.
	pub async fn handle(&self, test: &Test, status: Status, message: &str) -> Result<()> {
		if status.is_failure() {
			self.on_failure(test, status, message).await
		} else {
			self.on_success(test).await
		}
	}

	// A successful probe closes the active incident, but only once every
	// contact in its contact log has been told of the recovery. A failed
	// dispatch leaves the incident open so the next success retries.
	async fn on_success(&self, test: &Test) -> Result<()> {
		let Some(incident) = self.store.active_incident_for(&test.test_id).await? else {
			return Ok(());
		};
		let notified = self.store.incident_contacts(incident.incident_id).await?;
		let mut all_delivered = true;

		for contact in &notified {
			if let Err(err) = self.notifier.dispatch(contact, test, Notice::Recovery).await {
				tracing::warn!(
					test = %test.test_id,
					contact = %contact.contact_id,
					error = %err,
					"recovery notification failed, incident stays open"
				);

				all_delivered = false;
			}
		}

		if all_delivered {
			self.store.close_incident(incident.incident_id).await?;

			tracing::info!(
				test = %test.test_id,
				incident = incident.incident_id,
				"incident closed"
			);
		}

		Ok(())
	}

	async fn on_failure(&self, test: &Test, status: Status, message: &str) -> Result<()> {
		let incident_id = match self.store.active_incident_for(&test.test_id).await? {
			Some(incident) => incident.incident_id,
			None => {
				let incident_id = self.store.open_incident(&test.test_id, message).await?;

				tracing::info!(
					test = %test.test_id,
					incident = incident_id,
					root_cause = message,
					"incident opened"
				);

				incident_id
			},
		};

		for contact in self.store.contacts_to_notify(&test.test_id).await? {
			match self.notifier.dispatch(&contact, test, Notice::Failure { status, message }).await
			{
				Ok(()) =>
					self.store
						.insert_incident_contact_log(incident_id, &contact.contact_id, message)
						.await?,
				// Not retried within this outcome; the contact stays outside
				// the incident's contact log, so the next failing probe
				// picks it up again.
				Err(err) => tracing::warn!(
					test = %test.test_id,
					contact = %contact.contact_id,
					error = %err,
					"failure notification failed"
				),
			}
		}

		Ok(())
	}
}
