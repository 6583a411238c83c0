//! Tamper-evident encoding for lease internal state.
//!
//! The host hands issued leases back to the broker on renew and revoke. The internal state
//! carried with them (storage path, refresh token, upstream expiry) decides how long a lease
//! may live, so it travels as `base64url(json).base64url(hmac_sha256(json))` and is rejected
//! unless the tag verifies under this broker's key.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{
	Hmac, Mac,
	digest::{Key, KeyInit},
};
use rand::RngCore;
use serde::de::DeserializeOwned;
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, LeaseError},
	store::StoreError,
};

type HmacSha256 = Hmac<Sha256>;

/// Seals and verifies lease internal state with a shared HMAC key.
#[derive(Clone)]
pub struct LeaseSealer {
	mac: HmacSha256,
}
impl LeaseSealer {
	/// Minimum accepted key length in bytes.
	pub const MIN_KEY_LEN: usize = 32;

	/// Uses a host-provided key, so leases survive broker restarts.
	pub fn new(key: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
		let key = key.as_ref();

		if key.len() < Self::MIN_KEY_LEN {
			return Err(ConfigError::SealKeyTooShort { min: Self::MIN_KEY_LEN });
		}

		let mac = <HmacSha256 as Mac>::new_from_slice(key)
			.map_err(|_| ConfigError::SealKeyTooShort { min: Self::MIN_KEY_LEN })?;

		Ok(Self { mac })
	}

	/// Generates a process-local key; leases issued before a restart can no longer be renewed.
	pub fn random() -> Self {
		let mut key = Key::<HmacSha256>::default();

		rand::rng().fill_bytes(&mut key);

		Self { mac: <HmacSha256 as KeyInit>::new(&key) }
	}

	/// Encodes and authenticates `state`.
	pub fn seal<T>(&self, state: &T) -> Result<String>
	where
		T: Serialize,
	{
		let payload = serde_json::to_vec(state).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode lease state: {e}"),
		})?;
		let tag = self.mac.clone().chain_update(&payload).finalize().into_bytes();

		Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), URL_SAFE_NO_PAD.encode(tag)))
	}

	/// Verifies and decodes a value produced by [`LeaseSealer::seal`].
	pub fn unseal<T>(&self, sealed: &str) -> Result<T, LeaseError>
	where
		T: DeserializeOwned,
	{
		let (payload, tag) = sealed
			.split_once('.')
			.ok_or(LeaseError::InvalidState { reason: "missing signature" })?;
		let payload = URL_SAFE_NO_PAD
			.decode(payload)
			.map_err(|_| LeaseError::InvalidState { reason: "payload is not base64url" })?;
		let tag = URL_SAFE_NO_PAD
			.decode(tag)
			.map_err(|_| LeaseError::InvalidState { reason: "signature is not base64url" })?;

		self.mac
			.clone()
			.chain_update(&payload)
			.verify_slice(&tag)
			.map_err(|_| LeaseError::InvalidState { reason: "signature mismatch" })?;

		serde_json::from_slice(&payload)
			.map_err(|_| LeaseError::InvalidState { reason: "payload is not a lease state" })
	}
}
impl Debug for LeaseSealer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("LeaseSealer(<redacted>)")
	}
}
