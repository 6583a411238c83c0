//! Upstream endpoint configuration.

// self
use crate::_prelude::*;

/// Production Mashery V3 token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.mashery.com/v3/token";

/// Errors raised while constructing or validating endpoint configuration.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum EndpointError {
	/// Endpoint string could not be parsed.
	#[error("Endpoint `{url}` is not a valid URL: {reason}.")]
	InvalidUrl {
		/// Raw endpoint value.
		url: String,
		/// Parser message.
		reason: String,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Validated location of the upstream authorization server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasheryEndpoint {
	/// Token endpoint used for credential and refresh-token exchanges.
	pub token: Url,
}
impl MasheryEndpoint {
	/// Creates a new builder seeded with no overrides.
	pub fn builder() -> MasheryEndpointBuilder {
		MasheryEndpointBuilder::default()
	}

	/// Endpoint configuration for the public Mashery V3 API.
	pub fn production() -> Result<Self, EndpointError> {
		Self::builder().build()
	}
}

/// Builder for [`MasheryEndpoint`] values.
#[derive(Debug, Default)]
pub struct MasheryEndpointBuilder {
	/// Token endpoint override; defaults to [`DEFAULT_TOKEN_ENDPOINT`].
	pub token_endpoint: Option<Url>,
}
impl MasheryEndpointBuilder {
	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Parses and sets the token endpoint.
	pub fn token_endpoint_str(self, url: &str) -> Result<Self, EndpointError> {
		Ok(self.token_endpoint(parse(url)?))
	}

	/// Consumes the builder and validates the resulting endpoint.
	pub fn build(self) -> Result<MasheryEndpoint, EndpointError> {
		let token = match self.token_endpoint {
			Some(url) => url,
			None => parse(DEFAULT_TOKEN_ENDPOINT)?,
		};

		validate_endpoint("token", &token)?;

		Ok(MasheryEndpoint { token })
	}
}

fn parse(raw: &str) -> Result<Url, EndpointError> {
	Url::parse(raw)
		.map_err(|e| EndpointError::InvalidUrl { url: raw.to_owned(), reason: e.to_string() })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), EndpointError> {
	if url.scheme() != "https" {
		Err(EndpointError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
