//! Short-lived Mashery credentials issued from stored area records: time-salted V2 signatures
//! and leased V3 access tokens whose renewals never outlive the upstream token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod lease;
pub mod oauth;
pub mod obs;
pub mod seal;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{AreaName, CredentialFields},
		flows::Broker,
		oauth::{AccessGrant, ExchangeFuture, TokenExchange, V3Credentials},
		seal::LeaseSealer,
		store::{MemoryStorage, Storage},
	};
	#[cfg(feature = "reqwest")]
	use crate::{
		config::MasheryEndpoint,
		http::ReqwestHttpClient,
		oauth::{MasheryExchange, ReqwestTransportErrorMapper},
	};

	/// Key used by test brokers so sealed lease state is reproducible across broker instances.
	pub const TEST_SEAL_KEY: &[u8] = b"mashery-broker-test-seal-key-0123456789";

	/// Upstream exchange double that replays a fixed outcome and counts invocations.
	#[derive(Debug, Default)]
	pub struct FakeExchange {
		/// Grant returned by credential exchanges; `None` simulates an upstream rejection.
		pub grant: Option<AccessGrant>,
		/// When `true`, refresh-token exchanges fail with an upstream rejection.
		pub fail_refresh: bool,
		/// Number of credential exchanges performed.
		pub credential_calls: Mutex<u32>,
		/// Refresh tokens presented to the upstream, in order.
		pub refresh_calls: Mutex<Vec<String>>,
	}
	impl FakeExchange {
		/// Creates a double that grants `access`/`refresh` valid for `expires_in` seconds.
		pub fn granting(access: &str, refresh: &str, expires_in: i64) -> Self {
			Self {
				grant: Some(AccessGrant::new(access, Some(refresh.to_owned()), expires_in)),
				..Default::default()
			}
		}

		/// Creates a double whose every exchange is rejected upstream.
		pub fn rejecting() -> Self {
			Self { grant: None, fail_refresh: true, ..Default::default() }
		}

		/// Number of credential exchanges performed so far.
		pub fn credential_calls(&self) -> u32 {
			*self.credential_calls.lock()
		}

		/// Refresh tokens presented so far.
		pub fn refresh_calls(&self) -> Vec<String> {
			self.refresh_calls.lock().clone()
		}
	}
	impl TokenExchange for FakeExchange {
		fn exchange_credentials<'a>(
			&'a self,
			_credentials: &'a V3Credentials,
		) -> ExchangeFuture<'a, AccessGrant> {
			Box::pin(async move {
				*self.credential_calls.lock() += 1;

				self.grant
					.clone()
					.ok_or_else(|| Error::InvalidClient { reason: "Rejected by fake upstream.".into() })
			})
		}

		fn exchange_refresh_token<'a>(
			&'a self,
			_credentials: &'a V3Credentials,
			refresh_token: &'a str,
		) -> ExchangeFuture<'a, AccessGrant> {
			Box::pin(async move {
				self.refresh_calls.lock().push(refresh_token.to_owned());

				if self.fail_refresh {
					return Err(Error::InvalidGrant {
						reason: "Refresh token rejected by fake upstream.".into(),
					});
				}

				Ok(AccessGrant::new("access-after-refresh", None, 3600))
			})
		}
	}

	/// Builds a broker over fresh in-memory storage and the provided exchange double.
	pub fn build_test_broker(exchange: Arc<FakeExchange>) -> (Broker, Arc<MemoryStorage>) {
		let storage = Arc::new(MemoryStorage::default());
		let shared: Arc<dyn Storage> = storage.clone();
		let sealer = LeaseSealer::new(TEST_SEAL_KEY).expect("Test seal key should be accepted.");
		let broker = Broker::new(shared, exchange).with_sealer(sealer);

		(broker, storage)
	}

	/// Parses an area name fixture.
	pub fn area(name: &str) -> AreaName {
		AreaName::new(name).expect("Area name fixture should be valid.")
	}

	/// Field set carrying everything required for both V2 and V3 issuance.
	pub fn complete_fields() -> CredentialFields {
		CredentialFields {
			area_id: Some("a".into()),
			area_nid: Some(100),
			api_key: Some("k".into()),
			secret: Some("s".into()),
			username: Some("u".into()),
			password: Some("p".into()),
			qps: Some(2),
			lease_duration: Some(300),
		}
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a reqwest-backed exchange pointed at a mock token endpoint.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_exchange(
		token_url: &str,
	) -> MasheryExchange<ReqwestHttpClient, ReqwestTransportErrorMapper> {
		let endpoint = MasheryEndpoint::builder()
			.token_endpoint(Url::parse(token_url).expect("Mock token endpoint should parse."))
			.build()
			.expect("Mock token endpoint should be accepted.");

		MasheryExchange::with_http_client(
			endpoint,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
