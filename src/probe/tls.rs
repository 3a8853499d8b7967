//! TLS probe: handshake, cipher allow-list, validity-window, and OCSP
//! revocation checks.
//!
//! rustls performs hostname verification and chain validation during the
//! handshake; the checks below add the operational policy on top: no
//! insecure cipher suite, no certificate expiring within 30 days, and a
//! non-revoked OCSP status for every non-CA certificate in the chain.

// std
use std::collections::HashMap;
// crates.io
use reqwest::Client;
use rustls::{ClientConfig, RootCertStore, pki_types::ServerName};
use sha1::{Digest, Sha1};
use tokio::{net::TcpStream, time};
use tokio_rustls::TlsConnector;
use x509_parser::{
	certificate::X509Certificate,
	extensions::{GeneralName, ParsedExtension},
	parse_x509_certificate,
};
// self
use crate::{
	_prelude::*,
	probe::{ProbeFailure, ProbeResult},
};

/// Window before `NotAfter` in which a certificate is reported as expiring.
const EXPIRY_LEAD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// One cipher suite entry in the policy tables.
#[derive(Clone, Copy, Debug)]
pub struct CipherSuiteEntry {
	/// IANA cipher suite id.
	pub id: u16,
	/// Standard cipher suite name.
	pub name: &'static str,
	/// Whether the suite has known security issues.
	pub insecure: bool,
}

/// Accepted cipher suites.
pub const CIPHER_SUITES: &[CipherSuiteEntry] = &[
	CipherSuiteEntry { id: 0x002f, name: "TLS_RSA_WITH_AES_128_CBC_SHA", insecure: false },
	CipherSuiteEntry { id: 0x0035, name: "TLS_RSA_WITH_AES_256_CBC_SHA", insecure: false },
	CipherSuiteEntry { id: 0x009c, name: "TLS_RSA_WITH_AES_128_GCM_SHA256", insecure: false },
	CipherSuiteEntry { id: 0x009d, name: "TLS_RSA_WITH_AES_256_GCM_SHA384", insecure: false },
	CipherSuiteEntry { id: 0x1301, name: "TLS_AES_128_GCM_SHA256", insecure: false },
	CipherSuiteEntry { id: 0x1302, name: "TLS_AES_256_GCM_SHA384", insecure: false },
	CipherSuiteEntry { id: 0x1303, name: "TLS_CHACHA20_POLY1305_SHA256", insecure: false },
	CipherSuiteEntry { id: 0xc009, name: "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", insecure: false },
	CipherSuiteEntry { id: 0xc00a, name: "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", insecure: false },
	CipherSuiteEntry { id: 0xc013, name: "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", insecure: false },
	CipherSuiteEntry { id: 0xc014, name: "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", insecure: false },
	CipherSuiteEntry {
		id: 0xc02b,
		name: "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
		insecure: false,
	},
	CipherSuiteEntry {
		id: 0xc02c,
		name: "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
		insecure: false,
	},
	CipherSuiteEntry { id: 0xc02f, name: "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", insecure: false },
	CipherSuiteEntry { id: 0xc030, name: "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", insecure: false },
];

/// Recognised-but-rejected cipher suites.
///
/// RC4 suites are broken because RC4 is; CBC-SHA256 suites have no Lucky13
/// countermeasures.
pub const INSECURE_CIPHER_SUITES: &[CipherSuiteEntry] = &[
	CipherSuiteEntry { id: 0x000a, name: "TLS_RSA_WITH_3DES_EDE_CBC_SHA", insecure: true },
	CipherSuiteEntry { id: 0xc012, name: "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA", insecure: true },
	CipherSuiteEntry { id: 0x0005, name: "TLS_RSA_WITH_RC4_128_SHA", insecure: true },
	CipherSuiteEntry { id: 0x003c, name: "TLS_RSA_WITH_AES_128_CBC_SHA256", insecure: true },
	CipherSuiteEntry { id: 0xc007, name: "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA", insecure: true },
	CipherSuiteEntry { id: 0xc011, name: "TLS_ECDHE_RSA_WITH_RC4_128_SHA", insecure: true },
	CipherSuiteEntry {
		id: 0xc023,
		name: "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256",
		insecure: true,
	},
	CipherSuiteEntry { id: 0xc027, name: "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", insecure: true },
];

/// Look up a suite id in the policy tables.
pub fn cipher_suite(id: u16) -> Option<&'static CipherSuiteEntry> {
	CIPHER_SUITES
		.iter()
		.chain(INSECURE_CIPHER_SUITES.iter())
		.find(|entry| entry.id == id)
}

/// Perform one TLS attempt against `host:port`.
pub async fn probe(client: &Client, host: &str, port: u16, timeout: Duration) -> ProbeResult {
	let start = Instant::now();

	match attempt(client, host, port, timeout).await {
		Ok(()) => Ok(start.elapsed()),
		Err(err) => Err(ProbeFailure::at(start, err)),
	}
}

async fn attempt(client: &Client, host: &str, port: u16, timeout: Duration) -> Result<()> {
	let tcp = match time::timeout(timeout, TcpStream::connect((host, port))).await {
		Ok(tcp) => tcp?,
		Err(_) => return Err(Error::TimedOut { after_secs: timeout.as_secs() }),
	};
	let mut roots = RootCertStore::empty();

	roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

	let provider = Arc::new(rustls::crypto::ring::default_provider());
	let config = ClientConfig::builder_with_provider(provider)
		.with_safe_default_protocol_versions()
		.map_err(|err| Error::Handshake(err.to_string()))?
		.with_root_certificates(roots)
		.with_no_client_auth();
	let connector = TlsConnector::from(Arc::new(config));
	let server_name = ServerName::try_from(host.to_string())
		.map_err(|_| Error::Handshake(format!("invalid server name '{host}'")))?;
	let stream = connector
		.connect(server_name, tcp)
		.await
		.map_err(|err| Error::Handshake(err.to_string()))?;
	let (_, connection) = stream.get_ref();
	let suite_id = connection
		.negotiated_cipher_suite()
		.map(|suite| u16::from(suite.suite()))
		.ok_or_else(|| Error::Handshake("no cipher suite negotiated".into()))?;

	match cipher_suite(suite_id) {
		None =>
			return Err(Error::Handshake(format!(
				"could not find valid cipher suite for {suite_id}"
			))),
		Some(entry) if entry.insecure =>
			return Err(Error::Handshake(format!(
				"an insecure cipher suite is used, {}",
				entry.name
			))),
		Some(_) => {},
	}

	let chain: Vec<Vec<u8>> = connection
		.peer_certificates()
		.ok_or_else(|| Error::Verification("no peer certificates presented".into()))?
		.iter()
		.map(|der| der.as_ref().to_vec())
		.collect();

	verify_chain(client, &chain).await
}

async fn verify_chain(client: &Client, chain: &[Vec<u8>]) -> Result<()> {
	let mut certs = Vec::with_capacity(chain.len());

	for der in chain {
		let (_, cert) = parse_x509_certificate(der)
			.map_err(|err| Error::Verification(format!("could not parse certificate: {err}")))?;

		certs.push(cert);
	}

	let named: HashMap<String, &X509Certificate> =
		certs.iter().map(|cert| (cert.subject().to_string(), cert)).collect();
	let now = Utc::now().timestamp();
	let then = now + EXPIRY_LEAD.as_secs() as i64;

	for cert in &certs {
		let subject = cert.subject().to_string();

		if cert.validity().not_before.timestamp() > now {
			return Err(Error::Verification(format!("certificate is not yet valid: {subject}")));
		}
		if cert.validity().not_after.timestamp() < then {
			let remaining = cert.validity().not_after.timestamp() - now;

			return Err(Error::Verification(format!(
				"certificate will expire in {remaining} s: {subject}"
			)));
		}

		if !is_ca(cert) {
			let issuer = named
				.get(&cert.issuer().to_string())
				.ok_or_else(|| Error::Verification(format!("could not find issuer for {subject}")))?;

			if ocsp_status(client, cert, *issuer).await? == CertStatus::Revoked {
				return Err(Error::Verification(
					"certificate has been revoked by issuer".into(),
				));
			}
		}
	}

	Ok(())
}

fn is_ca(cert: &X509Certificate) -> bool {
	cert.basic_constraints()
		.ok()
		.flatten()
		.map(|ext| ext.value.ca)
		.unwrap_or(false)
}

/// OCSP certificate status as reported by the issuer's responder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CertStatus {
	Good,
	Revoked,
	Unknown,
}

async fn ocsp_status(
	client: &Client,
	cert: &X509Certificate<'_>,
	issuer: &X509Certificate<'_>,
) -> Result<CertStatus> {
	let responder = ocsp_responder(issuer)
		.ok_or_else(|| Error::Verification("could not find any ocsp servers".into()))?;
	let request = build_ocsp_request(cert, issuer);
	let response = client
		.post(responder)
		.header("content-type", "application/ocsp-request")
		.header("accept", "application/ocsp-response")
		.body(request)
		.timeout(Duration::from_secs(10))
		.send()
		.await?;
	let body = response.bytes().await?;

	parse_ocsp_status(&body)
}

fn ocsp_responder(issuer: &X509Certificate) -> Option<String> {
	issuer.extensions().iter().find_map(|ext| match ext.parsed_extension() {
		ParsedExtension::AuthorityInfoAccess(aia) => aia.accessdescs.iter().find_map(|desc| {
			if desc.access_method.to_id_string() == "1.3.6.1.5.5.7.48.1"
				&& let GeneralName::URI(uri) = &desc.access_location
			{
				Some((*uri).to_string())
			} else {
				None
			}
		}),
		_ => None,
	})
}

// RFC 6960 OCSPRequest with a single SHA-1 CertID and no extensions.
fn build_ocsp_request(cert: &X509Certificate, issuer: &X509Certificate) -> Vec<u8> {
	let name_hash = Sha1::digest(issuer.subject().as_raw());
	let key_hash = Sha1::digest(issuer.public_key().subject_public_key.data.as_ref());
	// AlgorithmIdentifier { sha1, NULL }
	let algorithm = der(0x30, &[&[0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a][..], &[0x05, 0x00]]);
	let cert_id = der(0x30, &[
		&algorithm,
		&der(0x04, &[&name_hash[..]]),
		&der(0x04, &[&key_hash[..]]),
		&der(0x02, &[cert.raw_serial()]),
	]);
	let request = der(0x30, &[&cert_id]);
	let request_list = der(0x30, &[&request]);
	let tbs_request = der(0x30, &[&request_list]);

	der(0x30, &[&tbs_request])
}

fn der(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
	let len: usize = parts.iter().map(|part| part.len()).sum();
	let mut out = vec![tag];

	if len < 0x80 {
		out.push(len as u8);
	} else {
		let bytes = len.to_be_bytes();
		let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);

		out.push(0x80 | (bytes.len() - first) as u8);
		out.extend_from_slice(&bytes[first..]);
	}

	for part in parts {
		out.extend_from_slice(part);
	}

	out
}

fn read_tlv(input: &[u8]) -> Result<(u8, &[u8], &[u8])> {
	let malformed = || Error::Verification("malformed ocsp response".into());

	if input.len() < 2 {
		return Err(malformed());
	}

	let tag = input[0];
	let (len, header) = if input[1] < 0x80 {
		(input[1] as usize, 2)
	} else {
		let count = (input[1] & 0x7f) as usize;

		if count == 0 || count > 4 || input.len() < 2 + count {
			return Err(malformed());
		}

		let mut len = 0_usize;

		for byte in &input[2..2 + count] {
			len = (len << 8) | *byte as usize;
		}

		(len, 2 + count)
	};

	if input.len() < header + len {
		return Err(malformed());
	}

	Ok((tag, &input[header..header + len], &input[header + len..]))
}

// Walks OCSPResponse -> responseBytes -> BasicOCSPResponse ->
// tbsResponseData -> responses[0] -> certStatus.
fn parse_ocsp_status(input: &[u8]) -> Result<CertStatus> {
	let malformed = || Error::Verification("malformed ocsp response".into());
	let (tag, mut body, _) = read_tlv(input)?;

	if tag != 0x30 {
		return Err(malformed());
	}

	// responseStatus ENUMERATED: 0 = successful.
	let (tag, status, rest) = read_tlv(body)?;

	if tag != 0x0a || status != [0x00] {
		return Err(Error::Verification("ocsp responder returned an error status".into()));
	}

	// [0] EXPLICIT responseBytes.
	let (tag, response_bytes, _) = read_tlv(rest)?;

	if tag != 0xa0 {
		return Err(malformed());
	}

	let (tag, mut response, _) = read_tlv(response_bytes)?;

	if tag != 0x30 {
		return Err(malformed());
	}

	// responseType OID, then the DER-encoded BasicOCSPResponse octets.
	let (tag, _oid, rest) = read_tlv(response)?;

	if tag != 0x06 {
		return Err(malformed());
	}

	let (tag, basic, _) = read_tlv(rest)?;

	if tag != 0x04 {
		return Err(malformed());
	}

	let (tag, basic_body, _) = read_tlv(basic)?;

	if tag != 0x30 {
		return Err(malformed());
	}

	let (tag, tbs, _) = read_tlv(basic_body)?;

	if tag != 0x30 {
		return Err(malformed());
	}

	// Skip optional version [0], responderID ([1] or [2]), producedAt.
	body = tbs;
	response = loop {
		let (tag, content, rest) = read_tlv(body)?;

		match tag {
			0xa0 | 0xa1 | 0xa2 | 0x18 => body = rest,
			0x30 => break content,
			_ => return Err(malformed()),
		}
	};

	// responses SEQUENCE OF SingleResponse; inspect the first.
	let (tag, single, _) = read_tlv(response)?;

	if tag != 0x30 {
		return Err(malformed());
	}

	// certID, then the tagged certStatus CHOICE.
	let (tag, _cert_id, rest) = read_tlv(single)?;

	if tag != 0x30 {
		return Err(malformed());
	}

	let (tag, _, _) = read_tlv(rest)?;

	match tag {
		0x80 => Ok(CertStatus::Good),
		0xa1 => Ok(CertStatus::Revoked),
		0x82 => Ok(CertStatus::Unknown),
		_ => Err(malformed()),
	}
}
