// self
use crate::{_prelude::*, lease::LeaseOptions, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("mashery_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs the bounds chosen for a freshly acquired V3 lease.
pub fn log_lease_issued(area: &str, lease_duration: i64, expires_in: i64, lease: &LeaseOptions) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		area,
		lease_duration,
		expires_in,
		ttl = lease.ttl.whole_seconds(),
		max_ttl = lease.max_ttl.whole_seconds(),
		"issued v3 lease"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (area, lease_duration, expires_in, lease);
}

/// Logs the TTL granted on renewal.
pub fn log_lease_renewed(remaining: i64, ceiling: Option<i64>, ttl: i64) {
	#[cfg(feature = "tracing")]
	tracing::debug!(remaining, ceiling, ttl, "renewed v3 lease");
	#[cfg(not(feature = "tracing"))]
	let _ = (remaining, ceiling, ttl);
}

/// Logs a best-effort step that failed without failing the caller.
pub fn log_suppressed(context: &'static str, err: &dyn StdError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %err, "{context}");
	#[cfg(not(feature = "tracing"))]
	let _ = (context, err);
}
