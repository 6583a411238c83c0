//! Operator-facing credential record management.

// self
use crate::{
	_prelude::*,
	auth::{AreaName, CredentialFields, CredentialRecord},
	flows::Broker,
	obs::{self, FlowKind},
};

/// Whether a write created a new record or merged into an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
	/// No record existed; defaults were applied.
	Created,
	/// An existing record was merged with the supplied fields.
	Updated,
}

impl Broker {
	/// Creates the area's record from scratch, applying defaults to omitted fields.
	///
	/// An existing record is replaced.
	pub async fn create_credentials(
		&self,
		area: &AreaName,
		fields: CredentialFields,
	) -> Result<CredentialRecord> {
		obs::observe(FlowKind::Credentials, "create_credentials", async move {
			fields.validate()?;

			let record = CredentialRecord::from_fields(fields);

			self.store.write(area, &record).await?;

			Ok(record)
		})
		.await
	}

	/// Merges the supplied fields into the area's existing record.
	pub async fn update_credentials(
		&self,
		area: &AreaName,
		fields: CredentialFields,
	) -> Result<CredentialRecord> {
		obs::observe(FlowKind::Credentials, "update_credentials", async move {
			fields.validate()?;

			self.store.update(area, fields).await
		})
		.await
	}

	/// Creates or updates the area's record depending on whether one is already stored.
	pub async fn write_credentials(
		&self,
		area: &AreaName,
		fields: CredentialFields,
	) -> Result<(WriteMode, CredentialRecord)> {
		if self.store.exists(area).await? {
			Ok((WriteMode::Updated, self.update_credentials(area, fields).await?))
		} else {
			Ok((WriteMode::Created, self.create_credentials(area, fields).await?))
		}
	}

	/// Reads the area's record, if any.
	pub async fn read_credentials(&self, area: &AreaName) -> Result<Option<CredentialRecord>> {
		obs::observe(FlowKind::Credentials, "read_credentials", self.store.read(area)).await
	}

	/// Deletes the area's record. Leases already issued from it keep running; their renewals
	/// fall back to the default ceiling and their revocations become no-ops.
	pub async fn delete_credentials(&self, area: &AreaName) -> Result<()> {
		obs::observe(FlowKind::Credentials, "delete_credentials", self.store.delete(area)).await
	}
}
