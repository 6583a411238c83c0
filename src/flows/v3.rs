//! V3 access token leases: acquire, renew, and revoke.
//!
//! A lease moves `issued -> (renewed)* -> {expired | revoked}`. Only the lease manager's TTL
//! bookkeeping changes on renewal; the sealed [`V3LeaseState`] is fixed at issuance and its
//! `token_expiry_time` bounds every later renewal.

// self
use crate::{
	_prelude::*,
	auth::{AreaName, Secret},
	error::{ConfigError, LeaseError},
	flows::Broker,
	lease::LeaseOptions,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Internal lease state, sealed before it leaves the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct V3LeaseState {
	/// Storage path of the owning credential record.
	pub storage_path: String,
	/// Refresh token used to invalidate the access token on revocation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<Secret>,
	/// Upstream expiry of the access token, as Unix seconds.
	pub token_expiry_time: i64,
}

/// Issued V3 artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedV3 {
	/// Bearer token handed to the caller.
	pub access_token: Secret,
	/// Advisory quota.
	pub max_qps: i64,
	/// Lease bounds.
	pub lease: LeaseOptions,
	/// Sealed [`V3LeaseState`], returned to the broker on renew and revoke.
	pub sealed_state: String,
}

/// What a revocation actually did. Revocation never fails the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevokeOutcome {
	/// The refresh token was exchanged and the access token invalidated upstream.
	Invalidated,
	/// Nothing to do: no refresh token, no record, or no key pair to present.
	Skipped,
	/// The state or the upstream exchange failed; the token will lapse at its expiry.
	Failed,
}

impl Broker {
	/// Exchanges the area's credentials for an access token and leases it.
	pub async fn acquire_v3(&self, area: &AreaName) -> Result<IssuedV3> {
		self.acquire(area, None).await
	}

	/// Like [`Broker::acquire_v3`], computing the token expiry relative to `now`.
	pub async fn acquire_v3_at(&self, area: &AreaName, now: OffsetDateTime) -> Result<IssuedV3> {
		self.acquire(area, Some(now)).await
	}

	/// Computes the TTL for renewing the sealed lease at the current time.
	pub async fn renew_v3(&self, sealed: &str) -> Result<Duration> {
		self.renew_v3_at(sealed, OffsetDateTime::now_utc()).await
	}

	/// Computes the TTL for renewing the sealed lease at `now`. Never calls the upstream.
	pub async fn renew_v3_at(&self, sealed: &str, now: OffsetDateTime) -> Result<Duration> {
		obs::observe(FlowKind::V3Renew, "renew_v3", async move {
			let state: V3LeaseState = self.sealer().unseal(sealed)?;
			let expires_at = OffsetDateTime::from_unix_timestamp(state.token_expiry_time)
				.map_err(|_| LeaseError::InvalidState { reason: "token expiry is out of range" })?;
			let ceiling = match self.store.read_path(&state.storage_path).await {
				Ok(record) => record.map(|record| Duration::seconds(record.lease_duration)),
				Err(e) => {
					obs::log_suppressed("renewal ceiling unavailable, using fallback", &e);

					None
				},
			};
			let ttl = self.policy.v3_renew(expires_at, now, ceiling)?;

			obs::log_lease_renewed(
				expires_at.unix_timestamp() - now.unix_timestamp(),
				ceiling.map(|value| value.whole_seconds()),
				ttl.whole_seconds(),
			);

			Ok(ttl)
		})
		.await
	}

	/// Best-effort revocation of the sealed lease.
	///
	/// Exchanging the refresh token makes the upstream invalidate the access token it was
	/// issued with. Every failure is logged and swallowed; an access token that could not be
	/// invalidated simply expires at its upstream expiry.
	pub async fn revoke_v3(&self, sealed: &str) -> RevokeOutcome {
		const KIND: FlowKind = FlowKind::V3Revoke;

		let span = FlowSpan::new(KIND, "revoke_v3");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome = span.instrument(self.revoke(sealed)).await;

		match outcome {
			RevokeOutcome::Failed => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
			_ => obs::record_flow_outcome(KIND, FlowOutcome::Success),
		}

		outcome
	}

	async fn acquire(&self, area: &AreaName, now: Option<OffsetDateTime>) -> Result<IssuedV3> {
		obs::observe(FlowKind::V3Acquire, "acquire_v3", async move {
			let record = self.store.read_existing(area).await?;
			let credentials = record.v3_credentials(area)?;
			let grant = self.exchange.exchange_credentials(&credentials).await?;
			let now = now.unwrap_or_else(OffsetDateTime::now_utc);
			let expires_at =
				now.checked_add(grant.expires_in).ok_or(ConfigError::ExpiresInOutOfRange)?;
			let lease =
				self.policy.v3_issue(Duration::seconds(record.lease_duration), grant.expires_in);
			let state = V3LeaseState {
				storage_path: area.storage_path(),
				refresh_token: grant.refresh_token,
				token_expiry_time: expires_at.unix_timestamp(),
			};
			let sealed_state = self.sealer().seal(&state)?;

			obs::log_lease_issued(
				area.as_ref(),
				record.lease_duration,
				grant.expires_in.whole_seconds(),
				&lease,
			);

			Ok(IssuedV3 {
				access_token: grant.access_token,
				max_qps: record.max_qps,
				lease,
				sealed_state,
			})
		})
		.await
	}

	async fn revoke(&self, sealed: &str) -> RevokeOutcome {
		let state: V3LeaseState = match self.sealer().unseal(sealed) {
			Ok(state) => state,
			Err(e) => {
				obs::log_suppressed("revocation skipped, lease state rejected", &e);

				return RevokeOutcome::Failed;
			},
		};
		let Some(refresh_token) = state.refresh_token else {
			return RevokeOutcome::Skipped;
		};
		let record = match self.store.read_path(&state.storage_path).await {
			Ok(Some(record)) => record,
			Ok(None) => return RevokeOutcome::Skipped,
			Err(e) => {
				obs::log_suppressed("revocation skipped, credential record unreadable", &e);

				return RevokeOutcome::Failed;
			},
		};

		if !record.supplies_key_and_secret() {
			return RevokeOutcome::Skipped;
		}

		match self
			.exchange
			.exchange_refresh_token(&record.exchange_credentials(), refresh_token.expose())
			.await
		{
			Ok(_) => RevokeOutcome::Invalidated,
			Err(e) => {
				obs::log_suppressed("revocation exchange failed", &e);

				RevokeOutcome::Failed
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{CredentialFields, CredentialRecord},
		error::ValidationError,
		store::{MemoryStorage, Storage},
	};

	const NOW: OffsetDateTime = datetime!(2026-03-01 00:00:00 UTC);

	async fn broker_with_area(exchange: FakeExchange) -> (Broker, Arc<FakeExchange>) {
		let exchange = Arc::new(exchange);
		let (broker, _) = build_test_broker(exchange.clone());

		broker
			.create_credentials(&area("prod"), complete_fields())
			.await
			.expect("Create should succeed.");

		(broker, exchange)
	}

	#[tokio::test]
	async fn acquire_bounds_lease_by_duration_and_expiry() {
		let (broker, exchange) =
			broker_with_area(FakeExchange::granting("access", "refresh", 3600)).await;
		let issued = broker.acquire_v3_at(&area("prod"), NOW).await.expect("Acquire should succeed.");

		assert_eq!(issued.access_token.expose(), "access");
		assert_eq!(issued.max_qps, 2);
		assert_eq!(issued.lease.ttl, Duration::seconds(300));
		assert_eq!(issued.lease.max_ttl, Duration::seconds(3600));
		assert!(issued.lease.renewable);
		assert_eq!(exchange.credential_calls(), 1);

		let state: V3LeaseState =
			broker.sealer().unseal(&issued.sealed_state).expect("State should unseal.");

		assert_eq!(state.storage_path, "area/prod");
		assert_eq!(state.refresh_token, Some(Secret::new("refresh")));
		assert_eq!(state.token_expiry_time, (NOW + Duration::hours(1)).unix_timestamp());
	}

	#[tokio::test]
	async fn short_upstream_expiry_wins() {
		let (broker, _) = broker_with_area(FakeExchange::granting("access", "refresh", 120)).await;
		let issued = broker.acquire_v3_at(&area("prod"), NOW).await.expect("Acquire should succeed.");

		assert_eq!(issued.lease.ttl, Duration::seconds(120));
		assert_eq!(issued.lease.max_ttl, Duration::hours(1));
	}

	#[tokio::test]
	async fn insufficient_record_never_calls_upstream() {
		let exchange = Arc::new(FakeExchange::granting("access", "refresh", 3600));
		let (broker, _) = build_test_broker(exchange.clone());
		let prod = area("prod");

		broker
			.create_credentials(
				&prod,
				CredentialFields { password: None, ..complete_fields() },
			)
			.await
			.expect("Create should succeed.");

		let err = broker.acquire_v3(&prod).await.expect_err("Acquire should fail.");

		assert!(matches!(err, Error::Validation(ValidationError::InsufficientV3Data { .. })));
		assert_eq!(exchange.credential_calls(), 0);
	}

	#[tokio::test]
	async fn upstream_rejection_propagates() {
		let (broker, _) = broker_with_area(FakeExchange::rejecting()).await;
		let err = broker.acquire_v3(&area("prod")).await.expect_err("Acquire should fail.");

		assert!(matches!(err, Error::InvalidClient { .. }));
	}

	#[tokio::test]
	async fn unrepresentable_upstream_expiry_is_rejected() {
		let (broker, _) =
			broker_with_area(FakeExchange::granting("access", "refresh", 1_000_000_000_000)).await;
		let err = broker
			.acquire_v3_at(&area("prod"), NOW)
			.await
			.expect_err("An expiry past the calendar range cannot be leased.");

		assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)));
	}

	#[tokio::test]
	async fn renew_respects_guard_band_and_expiry() {
		let (broker, exchange) =
			broker_with_area(FakeExchange::granting("access", "refresh", 3600)).await;
		let issued = broker.acquire_v3_at(&area("prod"), NOW).await.expect("Acquire should succeed.");
		let expiry = NOW + Duration::hours(1);
		let sealed = issued.sealed_state.as_str();

		assert_eq!(broker.renew_v3_at(sealed, NOW).await.ok(), Some(Duration::seconds(300)));
		assert_eq!(
			broker.renew_v3_at(sealed, expiry - Duration::seconds(16)).await.ok(),
			Some(Duration::seconds(16))
		);
		assert_eq!(
			broker
				.renew_v3_at(sealed, expiry - Duration::seconds(16) + Duration::milliseconds(500))
				.await
				.ok(),
			Some(Duration::seconds(16)),
			"Sub-second clock readings must not shorten the remaining window."
		);
		assert!(matches!(
			broker.renew_v3_at(sealed, expiry - Duration::seconds(15)).await,
			Err(Error::Lease(LeaseError::AlmostExpired { remaining: 15 }))
		));
		assert!(matches!(
			broker.renew_v3_at(sealed, expiry).await,
			Err(Error::Lease(LeaseError::Expired))
		));
		assert_eq!(exchange.credential_calls(), 1, "Renewal must not call the upstream.");
	}

	#[tokio::test]
	async fn renew_follows_current_record_and_falls_back_without_it() {
		let (broker, _) = broker_with_area(FakeExchange::granting("access", "refresh", 3600)).await;
		let prod = area("prod");
		let issued = broker.acquire_v3_at(&prod, NOW).await.expect("Acquire should succeed.");
		let sealed = issued.sealed_state.as_str();

		broker
			.update_credentials(
				&prod,
				CredentialFields { lease_duration: Some(60), ..Default::default() },
			)
			.await
			.expect("Update should succeed.");

		assert_eq!(broker.renew_v3_at(sealed, NOW).await.ok(), Some(Duration::seconds(60)));

		broker.delete_credentials(&prod).await.expect("Delete should succeed.");

		assert_eq!(broker.renew_v3_at(sealed, NOW).await.ok(), Some(Duration::hours(1)));
	}

	#[tokio::test]
	async fn renew_falls_back_on_unreadable_record() {
		let storage = Arc::new(MemoryStorage::default());
		let shared: Arc<dyn Storage> = storage.clone();
		let sealer = crate::seal::LeaseSealer::new(TEST_SEAL_KEY).expect("Key should be accepted.");
		let broker =
			Broker::new(shared, Arc::new(FakeExchange::granting("access", "refresh", 7200)))
				.with_sealer(sealer);
		let prod = area("prod");

		broker.create_credentials(&prod, complete_fields()).await.expect("Create should succeed.");

		let issued = broker.acquire_v3_at(&prod, NOW).await.expect("Acquire should succeed.");

		storage.put("area/prod", b"not json".to_vec()).await.expect("Raw put should succeed.");

		assert_eq!(
			broker.renew_v3_at(&issued.sealed_state, NOW).await.ok(),
			Some(Duration::hours(1))
		);
	}

	#[tokio::test]
	async fn tampered_state_is_rejected() {
		let (broker, _) = broker_with_area(FakeExchange::granting("access", "refresh", 3600)).await;
		let issued = broker.acquire_v3_at(&area("prod"), NOW).await.expect("Acquire should succeed.");
		let forged = crate::seal::LeaseSealer::random()
			.seal(&V3LeaseState {
				storage_path: "area/prod".into(),
				refresh_token: None,
				token_expiry_time: (NOW + Duration::days(365)).unix_timestamp(),
			})
			.expect("Sealing should succeed.");

		assert!(matches!(
			broker.renew_v3_at(&forged, NOW).await,
			Err(Error::Lease(LeaseError::InvalidState { .. }))
		));
		assert!(broker.renew_v3_at(&issued.sealed_state, NOW).await.is_ok());
	}

	#[tokio::test]
	async fn revoke_exchanges_refresh_token() {
		let (broker, exchange) =
			broker_with_area(FakeExchange::granting("access", "refresh", 3600)).await;
		let issued = broker.acquire_v3(&area("prod")).await.expect("Acquire should succeed.");

		assert_eq!(broker.revoke_v3(&issued.sealed_state).await, RevokeOutcome::Invalidated);
		assert_eq!(exchange.refresh_calls(), vec!["refresh".to_owned()]);
	}

	#[tokio::test]
	async fn revoke_swallows_upstream_failure() {
		let exchange = FakeExchange {
			fail_refresh: true,
			..FakeExchange::granting("access", "refresh", 3600)
		};
		let (broker, exchange) = broker_with_area(exchange).await;
		let issued = broker.acquire_v3(&area("prod")).await.expect("Acquire should succeed.");

		assert_eq!(broker.revoke_v3(&issued.sealed_state).await, RevokeOutcome::Failed);
		assert_eq!(exchange.refresh_calls().len(), 1);
	}

	#[tokio::test]
	async fn revoke_skips_without_key_pair_or_record() {
		let (broker, exchange) =
			broker_with_area(FakeExchange::granting("access", "refresh", 3600)).await;
		let prod = area("prod");
		let issued = broker.acquire_v3(&prod).await.expect("Acquire should succeed.");
		let keyless = CredentialRecord {
			api_secret: Secret::default(),
			..CredentialRecord::from_fields(complete_fields())
		};

		broker.store.write(&prod, &keyless).await.expect("Write should succeed.");

		assert_eq!(broker.revoke_v3(&issued.sealed_state).await, RevokeOutcome::Skipped);

		broker.delete_credentials(&prod).await.expect("Delete should succeed.");

		assert_eq!(broker.revoke_v3(&issued.sealed_state).await, RevokeOutcome::Skipped);
		assert!(exchange.refresh_calls().is_empty());
		assert_eq!(broker.revoke_v3("garbage").await, RevokeOutcome::Failed);
	}
}
