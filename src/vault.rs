//! Authenticated encryption for provider tokens at rest.
//!
//! [`CredentialVault`] seals plaintext with XChaCha20-Poly1305 under a fixed 32-byte key
//! loaded once at startup. Every seal draws a fresh 24-byte nonce and prepends it to the
//! ciphertext, so a [`SealedSecret`] is self-describing and the vault keeps no other state.
//! Persistence code only ever handles [`SealedSecret`] values; flows only ever handle
//! [`TokenSecret`] values.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
	XChaCha20Poly1305, XNonce,
	aead::{Aead, KeyInit},
};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Environment variable holding the base64-encoded vault key.
pub const VAULT_KEY_ENV: &str = "TOKEN_ENCRYPTION_KEY";
/// Required key length in bytes.
pub const VAULT_KEY_LEN: usize = 32;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Ciphertext produced by [`CredentialVault::seal`] (`nonce || ciphertext || tag`).
///
/// Serializes as standard base64 so it can live in a text column or JSON snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedSecret(Vec<u8>);
impl SealedSecret {
	/// Wraps raw sealed bytes read back from storage.
	pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	/// Raw sealed bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}
impl Debug for SealedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "SealedSecret({} bytes)", self.0.len())
	}
}
impl Serialize for SealedSecret {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&STANDARD.encode(&self.0))
	}
}
impl<'de> Deserialize<'de> for SealedSecret {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let encoded = String::deserialize(deserializer)?;

		STANDARD.decode(encoded.as_bytes()).map(Self).map_err(serde::de::Error::custom)
	}
}

/// Stateless seal/open boundary around a fixed symmetric key.
#[derive(Clone)]
pub struct CredentialVault {
	cipher: XChaCha20Poly1305,
	fingerprint: String,
}
impl CredentialVault {
	/// Builds a vault from raw key bytes.
	pub fn from_key_bytes(key: &[u8]) -> Result<Self, ConfigError> {
		if key.len() != VAULT_KEY_LEN {
			return Err(ConfigError::InvalidVaultKey { reason: "key must be exactly 32 bytes" });
		}

		let cipher = XChaCha20Poly1305::new_from_slice(key)
			.map_err(|_| ConfigError::InvalidVaultKey { reason: "key must be exactly 32 bytes" })?;

		Ok(Self { cipher, fingerprint: fingerprint(key) })
	}

	/// Builds a vault from a base64-encoded key.
	pub fn from_base64_key(encoded: &str) -> Result<Self, ConfigError> {
		let bytes = STANDARD
			.decode(encoded.trim().as_bytes())
			.map_err(|_| ConfigError::InvalidVaultKey { reason: "key is not valid base64" })?;

		Self::from_key_bytes(&bytes)
	}

	/// Loads the key from [`VAULT_KEY_ENV`].
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads the key through an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let encoded = lookup(VAULT_KEY_ENV)
			.filter(|value| !value.trim().is_empty())
			.ok_or(ConfigError::MissingVaultKey { variable: VAULT_KEY_ENV })?;
		let vault = Self::from_base64_key(&encoded)?;

		tracing::info!(fingerprint = vault.fingerprint(), "Credential vault key loaded.");

		Ok(vault)
	}

	/// Generates a fresh base64-encoded key suitable for [`VAULT_KEY_ENV`].
	pub fn generate_key() -> String {
		let mut key = [0_u8; VAULT_KEY_LEN];

		rand::rng().fill(&mut key);

		STANDARD.encode(key)
	}

	/// Short, non-reversible key identifier for startup logs.
	pub fn fingerprint(&self) -> &str {
		&self.fingerprint
	}

	/// Encrypts `plaintext` under a fresh nonce.
	pub fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret> {
		let mut nonce = [0_u8; NONCE_LEN];

		rand::rng().fill(&mut nonce);

		let ciphertext = self
			.cipher
			.encrypt(XNonce::from_slice(&nonce), plaintext)
			.map_err(|_| Error::EncryptionFailed)?;
		let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());

		sealed.extend_from_slice(&nonce);
		sealed.extend_from_slice(&ciphertext);

		Ok(SealedSecret(sealed))
	}

	/// Decrypts a payload produced by [`CredentialVault::seal`].
	pub fn open(&self, sealed: &SealedSecret) -> Result<Vec<u8>> {
		if sealed.0.len() < NONCE_LEN + TAG_LEN {
			return Err(Error::DecryptionFailed);
		}

		let (nonce, ciphertext) = sealed.0.split_at(NONCE_LEN);

		self.cipher
			.decrypt(XNonce::from_slice(nonce), ciphertext)
			.map_err(|_| Error::DecryptionFailed)
	}

	/// Seals a token secret.
	pub fn seal_token(&self, secret: &TokenSecret) -> Result<SealedSecret> {
		self.seal(secret.expose().as_bytes())
	}

	/// Opens a sealed token secret.
	pub fn open_token(&self, sealed: &SealedSecret) -> Result<TokenSecret> {
		let bytes = self.open(sealed)?;
		let value = String::from_utf8(bytes).map_err(|_| Error::DecryptionFailed)?;

		Ok(TokenSecret::new(value))
	}
}
impl Debug for CredentialVault {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialVault").field("fingerprint", &self.fingerprint).finish()
	}
}

fn fingerprint(key: &[u8]) -> String {
	let digest = Sha256::digest(key);

	digest.iter().take(4).map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn vault() -> CredentialVault {
		CredentialVault::from_key_bytes(&[7_u8; VAULT_KEY_LEN])
			.expect("Fixed test key should build a vault.")
	}

	#[test]
	fn seal_then_open_round_trips_arbitrary_bytes() {
		let vault = vault();

		for payload in [&b""[..], b"a", b"refresh-token-value", &[0_u8, 255, 1, 254][..]] {
			let sealed = vault.seal(payload).expect("Sealing should succeed.");

			assert_eq!(sealed.as_bytes().len(), NONCE_LEN + payload.len() + TAG_LEN);
			assert_eq!(vault.open(&sealed).expect("Opening should succeed."), payload);
		}
	}

	#[test]
	fn every_seal_uses_a_fresh_nonce() {
		let vault = vault();
		let first = vault.seal(b"same").expect("First seal should succeed.");
		let second = vault.seal(b"same").expect("Second seal should succeed.");

		assert_ne!(&first.as_bytes()[..NONCE_LEN], &second.as_bytes()[..NONCE_LEN]);
		assert_ne!(first, second);
	}

	#[test]
	fn tampered_or_foreign_ciphertext_fails() {
		let vault = vault();
		let sealed = vault.seal(b"access-token").expect("Sealing should succeed.");

		for idx in [0, NONCE_LEN, sealed.as_bytes().len() - 1] {
			let mut bytes = sealed.as_bytes().to_vec();

			bytes[idx] ^= 0x01;

			assert!(matches!(
				vault.open(&SealedSecret::from_bytes(bytes)),
				Err(Error::DecryptionFailed)
			));
		}

		let other = CredentialVault::from_key_bytes(&[9_u8; VAULT_KEY_LEN])
			.expect("Second test key should build a vault.");

		assert!(matches!(other.open(&sealed), Err(Error::DecryptionFailed)));
		assert!(matches!(
			vault.open(&SealedSecret::from_bytes(vec![1_u8; NONCE_LEN])),
			Err(Error::DecryptionFailed)
		));
	}

	#[test]
	fn key_loading_is_strict() {
		assert!(matches!(
			CredentialVault::from_lookup(|_| None),
			Err(ConfigError::MissingVaultKey { .. })
		));
		assert!(matches!(
			CredentialVault::from_base64_key("not base64!"),
			Err(ConfigError::InvalidVaultKey { .. })
		));
		assert!(matches!(
			CredentialVault::from_base64_key(&STANDARD.encode([1_u8; 16])),
			Err(ConfigError::InvalidVaultKey { .. })
		));

		let generated = CredentialVault::generate_key();
		let vault = CredentialVault::from_lookup(|_| Some(generated.clone()))
			.expect("Generated key should load.");

		assert_eq!(vault.fingerprint().len(), 8);
	}

	#[test]
	fn sealed_secret_serializes_as_base64_and_debug_hides_bytes() {
		let vault = vault();
		let sealed =
			vault.seal_token(&TokenSecret::new("plain")).expect("Token should seal successfully.");
		let encoded = serde_json::to_string(&sealed).expect("Sealed secret should serialize.");
		let decoded: SealedSecret =
			serde_json::from_str(&encoded).expect("Sealed secret should deserialize.");

		assert_eq!(vault.open_token(&decoded).expect("Token should open.").expose(), "plain");
		assert!(!format!("{sealed:?}").contains("plain"));
	}
}
