//! Lease TTL arithmetic shared by V2 issuance and the V3 token lifecycle.
//!
//! Every V3 lease is bounded twice: by the operator's configured lease duration and by the
//! upstream token's real expiry. Issuance picks the smaller of the two; renewal recomputes
//! the remaining window from the immutable expiry, so successive renewals can only shrink.

// self
use crate::{_prelude::*, error::LeaseError};

/// Lease bounds handed to the host's lease manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseOptions {
	/// Current validity window.
	pub ttl: Duration,
	/// Ceiling the host may renew up to; zero means "host default".
	pub max_ttl: Duration,
	/// Whether the host may call renew at all.
	pub renewable: bool,
}
impl LeaseOptions {
	/// Fixed-length lease that cannot be renewed.
	pub fn fixed(ttl: Duration) -> Self {
		Self { ttl, max_ttl: Duration::ZERO, renewable: false }
	}
}

/// Tunable constants for lease computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeasePolicy {
	/// Validity of a V2 signature.
	pub v2_ttl: Duration,
	/// Lower bound on the MaxTTL granted to V3 leases.
	pub max_ttl_floor: Duration,
	/// Renewals inside this window before expiry are refused.
	pub renewal_guard_band: Duration,
	/// Renewal ceiling used when the area record cannot be consulted.
	pub fallback_ceiling: Duration,
}
impl LeasePolicy {
	const DEFAULT_FALLBACK_CEILING: Duration = Duration::hours(1);
	const DEFAULT_GUARD_BAND: Duration = Duration::seconds(15);
	const DEFAULT_MAX_TTL_FLOOR: Duration = Duration::hours(1);
	const DEFAULT_V2_TTL: Duration = Duration::minutes(1);

	/// Overrides the V2 signature lease.
	pub fn with_v2_ttl(mut self, ttl: Duration) -> Self {
		self.v2_ttl = ttl;

		self
	}

	/// Overrides the MaxTTL floor for V3 leases.
	pub fn with_max_ttl_floor(mut self, floor: Duration) -> Self {
		self.max_ttl_floor = floor;

		self
	}

	/// Overrides the renewal guard band (negative values clamp to zero).
	pub fn with_renewal_guard_band(mut self, band: Duration) -> Self {
		self.renewal_guard_band = if band.is_negative() { Duration::ZERO } else { band };

		self
	}

	/// Overrides the fallback renewal ceiling.
	pub fn with_fallback_ceiling(mut self, ceiling: Duration) -> Self {
		self.fallback_ceiling = ceiling;

		self
	}

	/// Lease granted to a V2 signature.
	pub fn v2_lease(&self) -> LeaseOptions {
		LeaseOptions::fixed(self.v2_ttl)
	}

	/// Bounds for a freshly acquired V3 token.
	///
	/// `ttl = min(lease_duration, expires_in)` and `max_ttl = max(floor, ttl)`.
	pub fn v3_issue(&self, lease_duration: Duration, expires_in: Duration) -> LeaseOptions {
		let ttl = lease_duration.min(expires_in);

		LeaseOptions { ttl, max_ttl: self.max_ttl_floor.max(ttl), renewable: true }
	}

	/// New TTL for a renewal at `now` of a token expiring at `expires_at`.
	///
	/// `ceiling` is the area's configured lease duration, or `None` when the record could not
	/// be read, in which case [`LeasePolicy::fallback_ceiling`] applies.
	pub fn v3_renew(
		&self,
		expires_at: OffsetDateTime,
		now: OffsetDateTime,
		ceiling: Option<Duration>,
	) -> Result<Duration, LeaseError> {
		let remaining = Duration::seconds(expires_at.unix_timestamp() - now.unix_timestamp());

		if !remaining.is_positive() {
			return Err(LeaseError::Expired);
		}
		if remaining <= self.renewal_guard_band {
			return Err(LeaseError::AlmostExpired { remaining: remaining.whole_seconds() });
		}

		let ceiling =
			ceiling.filter(|value| value.is_positive()).unwrap_or(self.fallback_ceiling);

		Ok(remaining.min(ceiling))
	}
}
impl Default for LeasePolicy {
	fn default() -> Self {
		Self {
			v2_ttl: Self::DEFAULT_V2_TTL,
			max_ttl_floor: Self::DEFAULT_MAX_TTL_FLOOR,
			renewal_guard_band: Self::DEFAULT_GUARD_BAND,
			fallback_ceiling: Self::DEFAULT_FALLBACK_CEILING,
		}
	}
}
