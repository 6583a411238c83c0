//! Broker facade and the operations it exposes: credential CRUD, V2 signatures, and the V3
//! token lease lifecycle.

pub mod credentials;
pub mod v2;
pub mod v3;

pub use credentials::*;
pub use v2::*;
pub use v3::*;

// self
use crate::{
	_prelude::*,
	lease::LeasePolicy,
	oauth::TokenExchange,
	seal::LeaseSealer,
	store::{CredentialStore, Storage},
};
#[cfg(feature = "reqwest")]
use crate::{config::MasheryEndpoint, oauth::MasheryExchange};

/// Issues Mashery credentials for stored areas.
///
/// The broker holds no per-lease state. Everything a renewal or revocation needs travels
/// inside the sealed internal state returned with each V3 lease, so one broker (or any
/// broker sharing its [`LeaseSealer`] key) can serve every request.
#[derive(Clone)]
pub struct Broker {
	/// Credential records keyed by area.
	pub store: CredentialStore,
	/// Upstream token exchange shared by every V3 operation.
	pub exchange: Arc<dyn TokenExchange>,
	/// Lease bounds applied to issued artifacts.
	pub policy: LeasePolicy,
	sealer: LeaseSealer,
}
impl Broker {
	/// Creates a broker with the default lease policy and a process-local seal key.
	pub fn new(storage: Arc<dyn Storage>, exchange: Arc<dyn TokenExchange>) -> Self {
		Self {
			store: CredentialStore::new(storage),
			exchange,
			policy: LeasePolicy::default(),
			sealer: LeaseSealer::random(),
		}
	}

	/// Creates a broker that talks to the Mashery token endpoint over reqwest.
	#[cfg(feature = "reqwest")]
	pub fn with_mashery(storage: Arc<dyn Storage>, endpoint: MasheryEndpoint) -> Self {
		Self::new(storage, Arc::new(MasheryExchange::new(endpoint)))
	}

	/// Overrides the lease policy.
	pub fn with_policy(mut self, policy: LeasePolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Replaces the seal key, typically with one shared across broker restarts.
	pub fn with_sealer(mut self, sealer: LeaseSealer) -> Self {
		self.sealer = sealer;

		self
	}

	pub(crate) fn sealer(&self) -> &LeaseSealer {
		&self.sealer
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("store", &self.store)
			.field("policy", &self.policy)
			.field("sealer", &self.sealer)
			.finish_non_exhaustive()
	}
}
