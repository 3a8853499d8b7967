//! SSH probe: dial, authenticate, open a session, close.
//!
//! The host key is ignored: the probe asserts the service answers and
//! accepts the credential, not the host's identity. Credential plaintext
//! exists only for the duration of one attempt.

// crates.io
use russh::{Disconnect, client};
use russh_keys::key;
use tokio::time;
// self
use crate::{
	_prelude::*,
	model::SshSpec,
	probe::{ProbeFailure, ProbeResult},
	secret::SealKey,
};

struct AcceptAnyHostKey;
#[async_trait::async_trait]
impl client::Handler for AcceptAnyHostKey {
	type Error = russh::Error;

	async fn check_server_key(
		self,
		_server_public_key: &key::PublicKey,
	) -> std::result::Result<(Self, bool), Self::Error> {
		Ok((self, true))
	}
}

/// Perform one SSH attempt against `host:port` from the spec.
pub async fn probe(
	host: &str,
	timeout: Duration,
	spec: &SshSpec,
	seal_key: &SealKey,
) -> ProbeResult {
	let start = Instant::now();

	match time::timeout(timeout, attempt(host, spec, seal_key)).await {
		Ok(Ok(())) => Ok(start.elapsed()),
		Ok(Err(err)) => Err(ProbeFailure::at(start, err)),
		Err(_) =>
			Err(ProbeFailure::at(start, Error::TimedOut { after_secs: timeout.as_secs() })),
	}
}

async fn attempt(host: &str, spec: &SshSpec, seal_key: &SealKey) -> Result<()> {
	let credential = spec.credential.open(seal_key)?;
	let config = Arc::new(client::Config::default());
	let mut handle = client::connect(config, (host, spec.port), AcceptAnyHostKey).await?;
	let authenticated = if spec.use_key_pair {
		let passphrase = match &spec.passphrase {
			Some(sealed) => Some(sealed.open(seal_key)?),
			None => None,
		};
		let pair = russh_keys::decode_secret_key(
			&credential,
			passphrase.as_ref().map(|secret| secret.as_str()),
		)?;

		handle.authenticate_publickey(spec.username.as_str(), Arc::new(pair)).await?
	} else {
		handle.authenticate_password(spec.username.as_str(), credential.as_str()).await?
	};

	if !authenticated {
		return Err(Error::Auth(format!("server rejected credentials for {}", spec.username)));
	}

	let channel = handle.channel_open_session().await?;

	drop(channel);

	handle.disconnect(Disconnect::ByApplication, "", "en").await.ok();

	Ok(())
}
