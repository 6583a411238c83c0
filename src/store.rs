//! Durable storage contract and the credential record store built on top of it.
//!
//! [`Storage`] is the host's key-value backend: opaque bytes under string paths. The broker
//! never assumes more than per-call atomicity from it. [`CredentialStore`] layers the record
//! CRUD (including merge-on-update) over any backend; its read-merge-write update is not a
//! compare-and-swap, so concurrent writers to one area must be serialized by the backend.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::{
	_prelude::*,
	auth::{AreaName, CredentialFields, CredentialRecord},
};

/// Boxed future returned by [`Storage`] implementations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Path-keyed blob storage supplied by the host runtime.
pub trait Storage
where
	Self: Send + Sync,
{
	/// Fetches the value stored at `path`, if present.
	fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

	/// Stores or replaces the value at `path`.
	fn put<'a>(&'a self, path: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()>;

	/// Removes the value at `path`; missing entries are not an error.
	fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`Storage`] implementations and record decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding a record.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// CRUD access to area credential records.
#[derive(Clone)]
pub struct CredentialStore {
	storage: Arc<dyn Storage>,
}
impl CredentialStore {
	/// Wraps a storage backend.
	pub fn new(storage: Arc<dyn Storage>) -> Self {
		Self { storage }
	}

	/// Returns `true` when a record is stored for the area.
	pub async fn exists(&self, area: &AreaName) -> Result<bool> {
		Ok(self.storage.get(&area.storage_path()).await?.is_some())
	}

	/// Overwrites the full record stored for the area.
	pub async fn write(&self, area: &AreaName, record: &CredentialRecord) -> Result<()> {
		self.write_path(&area.storage_path(), record).await
	}

	/// Reads the area's record; `Ok(None)` when nothing is stored.
	pub async fn read(&self, area: &AreaName) -> Result<Option<CredentialRecord>> {
		self.read_path(&area.storage_path()).await
	}

	/// Reads the area's record, failing with [`Error::AreaNotFound`] when absent.
	pub async fn read_existing(&self, area: &AreaName) -> Result<CredentialRecord> {
		self.read(area).await?.ok_or_else(|| Error::AreaNotFound { area: area.to_string() })
	}

	/// Merges the supplied fields into the existing record and writes it back.
	pub async fn update(
		&self,
		area: &AreaName,
		fields: CredentialFields,
	) -> Result<CredentialRecord> {
		let mut record = self.read_existing(area).await?;

		record.merge(fields);
		self.write(area, &record).await?;

		Ok(record)
	}

	/// Removes the area's record.
	pub async fn delete(&self, area: &AreaName) -> Result<()> {
		Ok(self.storage.delete(&area.storage_path()).await?)
	}

	/// Reads a record by raw storage path, as carried in lease internal state.
	pub async fn read_path(&self, path: &str) -> Result<Option<CredentialRecord>> {
		let Some(bytes) = self.storage.get(path).await? else {
			return Ok(None);
		};

		decode_record(path, &bytes).map(Some).map_err(Error::from)
	}

	async fn write_path(&self, path: &str, record: &CredentialRecord) -> Result<()> {
		let bytes = serde_json::to_vec(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode record for {path}: {e}"),
		})?;

		Ok(self.storage.put(path, bytes).await?)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CredentialStore(..)")
	}
}

fn decode_record(path: &str, bytes: &[u8]) -> Result<CredentialRecord, StoreError> {
	let mut de = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut de).map_err(|e| StoreError::Serialization {
		message: format!("Cannot decode credential record at {path} ({}): {}", e.path(), e.inner()),
	})
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::_preludet::{area, complete_fields};

	fn store() -> (CredentialStore, Arc<MemoryStorage>) {
		let storage = Arc::new(MemoryStorage::default());

		(CredentialStore::new(storage.clone()), storage)
	}

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("database unreachable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[tokio::test]
	async fn write_read_delete_cycle() {
		let (store, _) = store();
		let prod = area("prod");
		let record = CredentialRecord::from_fields(complete_fields());

		assert!(!store.exists(&prod).await.expect("Existence check should succeed."));

		store.write(&prod, &record).await.expect("Write should succeed.");

		assert!(store.exists(&prod).await.expect("Existence check should succeed."));
		assert_eq!(store.read(&prod).await.expect("Read should succeed."), Some(record));

		store.delete(&prod).await.expect("Delete should succeed.");

		assert_eq!(store.read(&prod).await.expect("Read should succeed."), None);

		store.delete(&prod).await.expect("Deleting a missing area should not fail.");
	}

	#[tokio::test]
	async fn update_merges_only_supplied_fields() {
		let (store, _) = store();
		let prod = area("prod");
		let original = CredentialRecord::from_fields(complete_fields());

		store.write(&prod, &original).await.expect("Write should succeed.");

		let updated = store
			.update(&prod, CredentialFields { qps: Some(9), ..Default::default() })
			.await
			.expect("Update should succeed.");

		assert_eq!(updated, CredentialRecord { max_qps: 9, ..original.clone() });

		let reset = store
			.update(&prod, CredentialFields { lease_duration: Some(0), ..Default::default() })
			.await
			.expect("Update should succeed.");

		assert_eq!(reset.lease_duration, crate::auth::DEFAULT_LEASE_DURATION);
		assert_eq!(store.read(&prod).await.expect("Read should succeed."), Some(reset));
	}

	#[tokio::test]
	async fn update_of_missing_area_fails() {
		let (store, _) = store();
		let err = store
			.update(&area("ghost"), CredentialFields::default())
			.await
			.expect_err("Update of a missing area should fail.");

		assert!(matches!(err, Error::AreaNotFound { ref area } if area == "ghost"));
	}

	#[tokio::test]
	async fn malformed_payload_reports_field_path() {
		let (store, storage) = store();

		storage
			.put("area/broken", br#"{"area_nid":"not-a-number"}"#.to_vec())
			.await
			.expect("Raw put should succeed.");

		let err = store.read(&area("broken")).await.expect_err("Decode should fail.");

		assert!(matches!(err, Error::Storage(StoreError::Serialization { .. })));
		assert!(err.to_string().contains("area_nid"));
	}
}
