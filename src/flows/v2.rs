//! Time-salted V2 signatures.
//!
//! A signature is `hex(md5(api_key ++ secret ++ unix_seconds))`. It is bound to the second it
//! was computed in and nothing else, so a captured signature can be replayed for as long as the
//! gateway accepts that timestamp. The gateway defines that window; the broker cannot narrow it.

// crates.io
use md5::{Digest, Md5};
// self
use crate::{
	_prelude::*,
	auth::{AreaName, CredentialRecord},
	error::ValidationError,
	flows::Broker,
	lease::LeaseOptions,
	obs::{self, FlowKind},
};

/// Public fields of an issued V2 artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2Signature {
	/// Area numeric id.
	pub area_nid: i64,
	/// Package key.
	pub api_key: String,
	/// Advisory quota.
	#[serde(rename = "qps")]
	pub max_qps: i64,
	/// Hex-encoded MD5 signature.
	#[serde(rename = "sig")]
	pub signed_secret: String,
}
impl V2Signature {
	/// Signs the record's key and secret with the Unix timestamp of `now`.
	pub fn issue(
		record: &CredentialRecord,
		area: &AreaName,
		now: OffsetDateTime,
	) -> Result<Self, ValidationError> {
		record.ensure_v2_ready(area)?;

		let digest = Md5::new()
			.chain_update(&record.api_key)
			.chain_update(record.api_secret.expose())
			.chain_update(now.unix_timestamp().to_string())
			.finalize();

		Ok(Self {
			area_nid: record.area_nid,
			api_key: record.api_key.clone(),
			max_qps: record.max_qps,
			signed_secret: hex::encode(digest),
		})
	}
}

/// V2 artifact plus its fixed lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedV2 {
	/// Caller-visible fields.
	pub signature: V2Signature,
	/// Non-renewable lease.
	pub lease: LeaseOptions,
}

impl Broker {
	/// Issues a V2 signature for the area using the current time.
	pub async fn issue_v2(&self, area: &AreaName) -> Result<IssuedV2> {
		self.issue_v2_at(area, OffsetDateTime::now_utc()).await
	}

	/// Issues a V2 signature salted with `now`.
	pub async fn issue_v2_at(&self, area: &AreaName, now: OffsetDateTime) -> Result<IssuedV2> {
		obs::observe(FlowKind::V2Issue, "issue_v2", async move {
			let record = self.store.read_existing(area).await?;
			let signature = V2Signature::issue(&record, area, now)?;

			Ok(IssuedV2 { signature, lease: self.policy.v2_lease() })
		})
		.await
	}
}
