//! Sealed credentials: AES-256-GCM tokens of the form
//! `base64(nonce) "." base64(ciphertext)`.
//!
//! Only the sealed form is persisted or published on the bus; plaintext is
//! produced inside a probe attempt and zeroized when it ends.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use aes_gcm::{
	Aes256Gcm, Key, KeyInit, Nonce,
	aead::{Aead, AeadCore, OsRng},
};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};
// self
use crate::_prelude::*;

/// Symmetric key material decoded from the 64-hex `AES_KEY` setting.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealKey([u8; 32]);
impl SealKey {
	/// Decode a 64-character hex string into key material.
	pub fn from_hex(value: &str) -> Result<Self> {
		let decoded = hex::decode(value.trim()).map_err(|err| Error::Config {
			field: "AES_KEY",
			reason: format!("Invalid hex: {err}."),
		})?;
		let bytes: [u8; 32] = decoded.try_into().map_err(|_| Error::Config {
			field: "AES_KEY",
			reason: "Must decode to exactly 32 bytes.".into(),
		})?;

		Ok(Self(bytes))
	}
}
impl Debug for SealKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "SealKey(..)")
	}
}

/// An encrypted credential token safe to persist and to publish.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedSecret(String);
impl SealedSecret {
	/// Encrypt plaintext under the given key with a fresh 12-byte nonce.
	pub fn seal(key: &SealKey, plaintext: &[u8]) -> Result<Self> {
		let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
		let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
		let ciphertext = cipher
			.encrypt(&nonce, plaintext)
			.map_err(|_| Error::Unsealing("Encryption failed.".into()))?;

		Ok(Self(format!(
			"{}.{}",
			BASE64_STANDARD.encode(nonce),
			BASE64_STANDARD.encode(ciphertext)
		)))
	}

	/// Decrypt the token; the plaintext buffer is zeroized on drop.
	pub fn open(&self, key: &SealKey) -> Result<Zeroizing<String>> {
		let (nonce_part, cipher_part) = self
			.0
			.split_once('.')
			.ok_or_else(|| Error::Unsealing("Token is missing the nonce separator.".into()))?;
		let nonce = BASE64_STANDARD
			.decode(nonce_part)
			.map_err(|err| Error::Unsealing(format!("Invalid nonce encoding: {err}.")))?;
		let ciphertext = BASE64_STANDARD
			.decode(cipher_part)
			.map_err(|err| Error::Unsealing(format!("Invalid ciphertext encoding: {err}.")))?;

		if nonce.len() != 12 {
			return Err(Error::Unsealing("Nonce must be 12 bytes.".into()));
		}

		let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
		let mut plaintext = cipher
			.decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
			.map_err(|_| Error::Unsealing("Decryption failed.".into()))?;
		let text = String::from_utf8(plaintext.clone()).map_err(|_| {
			plaintext.zeroize();

			Error::Unsealing("Plaintext is not valid UTF-8.".into())
		})?;

		plaintext.zeroize();

		Ok(Zeroizing::new(text))
	}

	/// Whether the token is empty (no credential configured).
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Wrap an already-sealed token, e.g. one read from the store.
	pub fn from_token(token: impl Into<String>) -> Self {
		Self(token.into())
	}

	/// The sealed token string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for SealedSecret {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "SealedSecret({})", self.0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn key() -> SealKey {
		SealKey::from_hex(&"ab".repeat(32)).expect("key")
	}

	#[test]
	fn seal_then_open_round_trips() {
		let sealed = SealedSecret::seal(&key(), b"hunter2").expect("seal");

		assert_eq!(sealed.open(&key()).expect("open").as_str(), "hunter2");
	}

	#[test]
	fn tokens_carry_nonce_and_ciphertext_parts() {
		let sealed = SealedSecret::seal(&key(), b"hunter2").expect("seal");
		let (nonce, _) = sealed.as_str().split_once('.').expect("separator");

		assert_eq!(BASE64_STANDARD.decode(nonce).expect("nonce").len(), 12);
	}

	#[test]
	fn open_rejects_a_foreign_key() {
		let sealed = SealedSecret::seal(&key(), b"hunter2").expect("seal");
		let other = SealKey::from_hex(&"cd".repeat(32)).expect("key");

		assert!(sealed.open(&other).is_err());
	}

	#[test]
	fn key_requires_exactly_32_bytes() {
		assert!(SealKey::from_hex("abcd").is_err());
		assert!(SealKey::from_hex("zz".repeat(32).as_str()).is_err());
	}
}
