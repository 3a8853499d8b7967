//! ICMP probe: echo against the resolved IPv4 address.

// crates.io
use tokio::{net, time};
// self
use crate::{
	_prelude::*,
	probe::{ProbeFailure, ProbeResult},
};

/// Send one echo request; any reply within the timeout is a success.
pub async fn probe(host: &str, timeout: Duration) -> ProbeResult {
	let start = Instant::now();
	let addr = match net::lookup_host((host, 0)).await {
		Ok(mut addrs) => match addrs.find(|addr| addr.is_ipv4()) {
			Some(addr) => addr.ip(),
			None =>
				return Err(ProbeFailure::at(
					start,
					Error::Protocol(format!("no ipv4 address found for {host}")),
				)),
		},
		Err(err) => return Err(ProbeFailure::at(start, err.into())),
	};

	match time::timeout(timeout, surge_ping::ping(addr, &[0; 8])).await {
		Ok(Ok((_reply, round_trip))) => Ok(round_trip),
		Ok(Err(err)) => Err(ProbeFailure::at(start, err.into())),
		Err(_) =>
			Err(ProbeFailure::at(start, Error::TimedOut { after_secs: timeout.as_secs() })),
	}
}
