//! Durable per-area credential records and their partial-update field sets.

// self
use crate::{
	_prelude::*,
	auth::{AreaName, Secret},
	error::ValidationError,
	oauth::V3Credentials,
};

/// Advisory queries-per-second applied when a record is created without `qps`.
pub const DEFAULT_QPS: i64 = 2;
/// V3 lease duration, in seconds, applied when none (or zero) is configured.
pub const DEFAULT_LEASE_DURATION: i64 = 15 * 60;

/// Long-lived credentials stored for a named area.
///
/// A record may be partially populated: operators are encouraged to store only what the
/// intended artifact needs, so readiness is checked when an artifact is issued rather than
/// when the record is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
	/// Area UUID, required for V3 tokens.
	#[serde(default)]
	pub area_id: String,
	/// Area numeric id, required for V2 signatures.
	#[serde(default)]
	pub area_nid: i64,
	/// Package key.
	#[serde(default)]
	pub api_key: String,
	/// Package key secret.
	#[serde(default, rename = "secret")]
	pub api_secret: Secret,
	/// V3 API user.
	#[serde(default)]
	pub username: String,
	/// V3 API user password.
	#[serde(default)]
	pub password: Secret,
	/// Advisory quota passed through to issued artifacts.
	#[serde(default, rename = "qps")]
	pub max_qps: i64,
	/// Upper bound on the TTL of issued V3 leases, in seconds.
	#[serde(default, rename = "duration")]
	pub lease_duration: i64,
}
impl CredentialRecord {
	/// Builds a full record from create-request fields, defaulting `qps` and the lease.
	pub fn from_fields(fields: CredentialFields) -> Self {
		let mut record = Self {
			area_id: String::new(),
			area_nid: 0,
			api_key: String::new(),
			api_secret: Secret::default(),
			username: String::new(),
			password: Secret::default(),
			max_qps: DEFAULT_QPS,
			lease_duration: DEFAULT_LEASE_DURATION,
		};

		record.merge(fields);

		record
	}

	/// Overwrites only the supplied fields and re-normalizes the lease duration.
	pub fn merge(&mut self, fields: CredentialFields) {
		let CredentialFields {
			area_id,
			area_nid,
			api_key,
			secret,
			username,
			password,
			qps,
			lease_duration,
		} = fields;

		if let Some(value) = area_id {
			self.area_id = value;
		}
		if let Some(value) = area_nid {
			self.area_nid = value;
		}
		if let Some(value) = api_key {
			self.api_key = value;
		}
		if let Some(value) = secret {
			self.api_secret = value.into();
		}
		if let Some(value) = username {
			self.username = value;
		}
		if let Some(value) = password {
			self.password = value.into();
		}
		if let Some(value) = qps {
			self.max_qps = value;
		}
		if let Some(value) = lease_duration {
			self.lease_duration = value;
		}

		self.normalize();
	}

	/// Replaces a zero lease duration with [`DEFAULT_LEASE_DURATION`].
	pub fn normalize(&mut self) {
		if self.lease_duration == 0 {
			self.lease_duration = DEFAULT_LEASE_DURATION;
		}
	}

	/// Returns `true` when both the package key and its secret are present.
	pub fn supplies_key_and_secret(&self) -> bool {
		!self.api_key.is_empty() && !self.api_secret.is_empty()
	}

	/// Checks that the record can produce a V2 signature.
	pub fn ensure_v2_ready(&self, area: &AreaName) -> Result<(), ValidationError> {
		if self.area_nid == 0 || !self.supplies_key_and_secret() {
			return Err(ValidationError::InsufficientV2Data { area: area.to_string() });
		}

		Ok(())
	}

	/// Returns `true` when the record can be exchanged for a V3 token.
	pub fn is_v3_ready(&self) -> bool {
		!self.area_id.is_empty()
			&& self.supplies_key_and_secret()
			&& !self.username.is_empty()
			&& !self.password.is_empty()
	}

	/// Extracts the upstream exchange credentials, failing when the record is not V3-ready.
	pub fn v3_credentials(&self, area: &AreaName) -> Result<V3Credentials, ValidationError> {
		if !self.is_v3_ready() {
			return Err(ValidationError::InsufficientV3Data { area: area.to_string() });
		}

		Ok(self.exchange_credentials())
	}

	/// Credentials for a refresh-token exchange, which only needs the key pair and area.
	pub(crate) fn exchange_credentials(&self) -> V3Credentials {
		V3Credentials {
			area_id: self.area_id.clone(),
			api_key: self.api_key.clone(),
			api_secret: self.api_secret.clone(),
			username: self.username.clone(),
			password: self.password.clone(),
		}
	}
}

/// Fields supplied by a create or update request; `None` means "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialFields {
	/// Area UUID.
	pub area_id: Option<String>,
	/// Area numeric id.
	pub area_nid: Option<i64>,
	/// Package key.
	pub api_key: Option<String>,
	/// Package key secret.
	pub secret: Option<String>,
	/// V3 API user.
	pub username: Option<String>,
	/// V3 API user password.
	pub password: Option<String>,
	/// Advisory quota.
	pub qps: Option<i64>,
	/// Lease duration in seconds; zero resets to the default.
	pub lease_duration: Option<i64>,
}
impl CredentialFields {
	/// Rejects negative numeric fields.
	pub fn validate(&self) -> Result<(), ValidationError> {
		for (field, value) in
			[("area_nid", self.area_nid), ("qps", self.qps), ("lease_duration", self.lease_duration)]
		{
			if value.is_some_and(i64::is_negative) {
				return Err(ValidationError::InvalidField {
					field: field.into(),
					reason: "must not be negative".into(),
				});
			}
		}

		Ok(())
	}
}
