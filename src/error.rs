//! Broker-level error types shared across flows, stores, and the host adapter.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Caller-supplied or stored data cannot satisfy the request.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Lease cannot be renewed or its internal state cannot be trusted.
	#[error(transparent)]
	Lease(#[from] LeaseError),
	/// Host request does not map onto a supported operation.
	#[error(transparent)]
	Request(#[from] RequestError),

	/// No credential record is stored for the area.
	#[error("No credentials are stored for area `{area}`.")]
	AreaNotFound {
		/// Logical area name.
		area: String,
	},
	/// Upstream rejected the grant (bad username/password or refresh token).
	#[error("Upstream rejected the grant: {reason}.")]
	InvalidGrant {
		/// Upstream- or broker-supplied reason string.
		reason: String,
	},
	/// Upstream rejected the API key and secret.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Upstream- or broker-supplied reason string.
		reason: String,
	},
}

/// Configuration failures raised while talking to the upstream.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Endpoint configuration failed validation.
	#[error(transparent)]
	Endpoint(#[from] crate::config::EndpointError),
	/// Configured token endpoint cannot be handed to the OAuth client.
	#[error("Token endpoint is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Seal key is too short to authenticate lease state.
	#[error("Lease seal key must be at least {min} bytes.")]
	SealKeyTooShort {
		/// Minimum accepted key length.
		min: usize,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Upstream- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Record or request data that cannot produce the requested artifact.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// V2 signatures need the area numeric id, API key, and secret.
	#[error("Insufficient data to generate a V2 signature for area `{area}`.")]
	InsufficientV2Data {
		/// Logical area name.
		area: String,
	},
	/// V3 tokens need the area id, API key, secret, username, and password.
	#[error("Area `{area}` data is not sufficient to request a V3 access token.")]
	InsufficientV3Data {
		/// Logical area name.
		area: String,
	},
	/// Area name failed validation.
	#[error(transparent)]
	AreaName(#[from] crate::auth::IdentifierError),
	/// A request field has the wrong shape.
	#[error("Field `{field}` is invalid: {reason}.")]
	InvalidField {
		/// Field path reported by the decoder.
		field: String,
		/// Decoder message.
		reason: String,
	},
}

/// Renewal and internal-state failures for issued leases.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum LeaseError {
	/// The upstream token is already past its expiry.
	#[error("Lease cannot be renewed as the token has expired.")]
	Expired,
	/// The upstream token is inside the renewal guard band.
	#[error("Lease almost expired ({remaining}s left), request a new one instead.")]
	AlmostExpired {
		/// Seconds left before the upstream token expires.
		remaining: i64,
	},
	/// The secret kind does not support renewal.
	#[error("Secret `{kind}` is not renewable.")]
	NotRenewable {
		/// Secret kind label.
		kind: &'static str,
	},
	/// Internal lease state is missing, malformed, or was not sealed by this broker.
	#[error("Lease internal state is invalid: {reason}.")]
	InvalidState {
		/// Short description of the failed check.
		reason: &'static str,
	},
}

/// Host requests that the adapter cannot route.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum RequestError {
	/// No path pattern matches.
	#[error("No handler for path `{path}`.")]
	UnknownPath {
		/// Requested path.
		path: String,
	},
	/// The path exists but does not support the operation.
	#[error("Operation `{operation}` is not supported on `{path}`.")]
	UnsupportedOperation {
		/// Operation label.
		operation: &'static str,
		/// Requested path.
		path: String,
	},
	/// Renew or revoke was requested without a previously issued secret.
	#[error("Request does not bear a secret.")]
	MissingSecret,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn lease_errors_render_guidance() {
		let err: Error = LeaseError::AlmostExpired { remaining: 12 }.into();

		assert!(matches!(err, Error::Lease(LeaseError::AlmostExpired { remaining: 12 })));
		assert_eq!(err.to_string(), "Lease almost expired (12s left), request a new one instead.");
		assert_eq!(
			Error::from(LeaseError::Expired).to_string(),
			"Lease cannot be renewed as the token has expired."
		);
	}

	#[test]
	fn validation_errors_name_the_area() {
		let err: Error = ValidationError::InsufficientV2Data { area: "prod".into() }.into();

		assert!(err.to_string().contains("`prod`"));
	}
}
