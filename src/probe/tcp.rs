//! TCP probe: resolve, dial, close.

// crates.io
use tokio::{net::TcpStream, time};
// self
use crate::{
	_prelude::*,
	probe::{ProbeFailure, ProbeResult},
};

/// Dial `host:port` within the timeout; the connection is dropped
/// immediately on success.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
	let start = Instant::now();
	let addr = format!("{host}:{port}");

	match time::timeout(timeout, TcpStream::connect(&addr)).await {
		Ok(Ok(_stream)) => Ok(start.elapsed()),
		Ok(Err(err)) => Err(ProbeFailure::at(start, err.into())),
		Err(_) =>
			Err(ProbeFailure::at(start, Error::TimedOut { after_secs: timeout.as_secs() })),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::net::TcpListener;
	// self
	use super::*;

	#[tokio::test]
	async fn dialing_a_listening_socket_succeeds() {
		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let port = listener.local_addr().expect("addr").port();

		assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await.is_ok());
	}

	#[tokio::test]
	async fn dialing_a_closed_port_fails() {
		// Bind-and-drop to find a port that is very likely closed.
		let port = {
			let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");

			listener.local_addr().expect("addr").port()
		};

		assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await.is_err());
	}
}
