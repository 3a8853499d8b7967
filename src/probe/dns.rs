//! DNS probe: look up a record kind through each configured resolver and
//! compare the result set against the expected values.

// std
use std::{collections::HashSet, net::IpAddr};
// crates.io
use hickory_resolver::{
	TokioAsyncResolver,
	config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
	proto::rr::RecordType,
};
// self
use crate::{
	_prelude::*,
	model::{DnsSpec, MatchStrategy, RecordKind},
	probe::{ProbeFailure, ProbeResult},
};

/// Query each resolver in turn; the first one satisfying the strategy
/// short-circuits success, otherwise the last failure is reported.
pub async fn probe(
	resolvers: &[IpAddr],
	domain: &str,
	timeout: Duration,
	spec: &DnsSpec,
) -> ProbeResult {
	let start = Instant::now();
	let check: HashSet<String> = spec.check.iter().map(|value| normalize(value)).collect();
	let mut last_failure = Error::Protocol("no resolvers configured".into());

	for server in resolvers {
		let result = match lookup(*server, domain, timeout, spec.record).await {
			Ok(result) => result,
			Err(err) => {
				last_failure = err;

				continue;
			},
		};
		let observed: HashSet<String> = result.iter().map(|value| normalize(value)).collect();

		match compare(spec.strategy, &check, &observed) {
			Ok(()) => return Ok(start.elapsed()),
			Err(err) => last_failure = err,
		}
	}

	Err(ProbeFailure::at(start, last_failure))
}

async fn lookup(
	server: IpAddr,
	domain: &str,
	timeout: Duration,
	record: RecordKind,
) -> Result<Vec<String>> {
	let group = NameServerConfigGroup::from_ips_clear(&[server], 53, true);
	let config = ResolverConfig::from_parts(None, Vec::new(), group);
	let mut opts = ResolverOpts::default();

	opts.timeout = timeout;
	opts.attempts = 1;

	let resolver = TokioAsyncResolver::tokio(config, opts);
	let values = match record {
		RecordKind::A => resolver
			.lookup_ip(domain)
			.await?
			.iter()
			.map(|ip| ip.to_string())
			.collect(),
		RecordKind::Cname => resolver
			.lookup(domain, RecordType::CNAME)
			.await?
			.iter()
			.map(|rdata| rdata.to_string())
			.collect(),
		RecordKind::Txt => resolver
			.txt_lookup(domain)
			.await?
			.iter()
			.map(|txt| txt.to_string())
			.collect(),
		RecordKind::Mx => resolver
			.mx_lookup(domain)
			.await?
			.iter()
			.map(|mx| mx.exchange().to_string())
			.collect(),
		RecordKind::Ns => resolver
			.ns_lookup(domain)
			.await?
			.iter()
			.map(|ns| ns.to_string())
			.collect(),
	};

	Ok(values)
}

fn compare(
	strategy: MatchStrategy,
	check: &HashSet<String>,
	observed: &HashSet<String>,
) -> Result<()> {
	match strategy {
		MatchStrategy::Exact => {
			if observed.len() != check.len() {
				return Err(Error::Protocol(
					"dns result size does not match expected number of records".into(),
				));
			}

			compare(MatchStrategy::CheckIsSubset, check, observed)
		},
		MatchStrategy::CheckIsSubset =>
			if check.is_subset(observed) {
				Ok(())
			} else {
				Err(Error::Protocol("all checks were not contained in dns result".into()))
			},
		MatchStrategy::DnsIsSubset =>
			if observed.is_subset(check) {
				Ok(())
			} else {
				Err(Error::Protocol("all dns results were not contained in checks".into()))
			},
		MatchStrategy::Intersects =>
			if check.is_disjoint(observed) {
				Err(Error::Protocol("dns result did not intersect with check".into()))
			} else {
				Ok(())
			},
	}
}

// Lookups return fully-qualified names with a trailing dot; configured
// values usually come without one.
fn normalize(value: &str) -> String {
	value.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn set(values: &[&str]) -> HashSet<String> {
		values.iter().map(|value| normalize(value)).collect()
	}

	#[test]
	fn exact_requires_set_equality() {
		assert!(compare(MatchStrategy::Exact, &set(&["a", "b"]), &set(&["b", "a."])).is_ok());
		assert!(compare(MatchStrategy::Exact, &set(&["a", "b"]), &set(&["a", "b", "c"])).is_err());
		assert!(compare(MatchStrategy::Exact, &set(&["a", "b", "c"]), &set(&["a", "b"])).is_err());
	}

	#[test]
	fn check_is_subset_allows_extra_dns_records() {
		assert!(
			compare(MatchStrategy::CheckIsSubset, &set(&["a", "b"]), &set(&["a", "b", "c"]))
				.is_ok()
		);
		assert!(
			compare(MatchStrategy::CheckIsSubset, &set(&["a", "d"]), &set(&["a", "b", "c"]))
				.is_err()
		);
	}

	#[test]
	fn dns_is_subset_allows_extra_check_values() {
		assert!(
			compare(MatchStrategy::DnsIsSubset, &set(&["a", "b", "c"]), &set(&["a", "b"])).is_ok()
		);
		assert!(
			compare(MatchStrategy::DnsIsSubset, &set(&["a", "b"]), &set(&["a", "e"])).is_err()
		);
	}

	#[test]
	fn intersects_needs_any_overlap() {
		assert!(
			compare(MatchStrategy::Intersects, &set(&["a", "b"]), &set(&["b", "z"])).is_ok()
		);
		assert!(
			compare(MatchStrategy::Intersects, &set(&["a", "b"]), &set(&["x", "y"])).is_err()
		);
	}
}
