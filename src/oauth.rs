//! Upstream token exchange contract and its `oauth2`-backed Mashery implementation.

pub use oauth2;

// crates.io
use oauth2::{
	ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	config::MasheryEndpoint,
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

/// Boxed future returned by [`TokenExchange`] implementations.
pub type ExchangeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Credentials presented to the upstream authorization server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V3Credentials {
	/// Area UUID, sent as the requested scope.
	pub area_id: String,
	/// Package key, used as the OAuth client id.
	pub api_key: String,
	/// Package key secret, used as the OAuth client secret.
	pub api_secret: Secret,
	/// V3 API user.
	pub username: String,
	/// V3 API user password.
	pub password: Secret,
}

/// Token pair granted by the upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
	/// Bearer token handed to the caller.
	pub access_token: Secret,
	/// Refresh token, kept in lease internal state for revocation.
	pub refresh_token: Option<Secret>,
	/// Remaining validity reported by the upstream, relative to the response.
	pub expires_in: Duration,
}
impl AccessGrant {
	/// Builds a grant valid for `expires_in` seconds.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: Option<String>,
		expires_in: i64,
	) -> Self {
		Self {
			access_token: Secret::new(access_token),
			refresh_token: refresh_token.map(Secret::new),
			expires_in: Duration::seconds(expires_in),
		}
	}
}

/// Black-box upstream exchange shared by every V3 operation.
///
/// Implementations hold no per-request state; a single instance is injected into the broker.
pub trait TokenExchange
where
	Self: Send + Sync,
{
	/// Exchanges the long-lived credentials for an access/refresh token pair.
	fn exchange_credentials<'a>(
		&'a self,
		credentials: &'a V3Credentials,
	) -> ExchangeFuture<'a, AccessGrant>;

	/// Exchanges a refresh token; the upstream invalidates the access token it was issued with.
	fn exchange_refresh_token<'a>(
		&'a self,
		credentials: &'a V3Credentials,
		refresh_token: &'a str,
	) -> ExchangeFuture<'a, AccessGrant>;
}

/// Grant types sent to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// Resource owner password credentials.
	Password,
	/// Refresh token exchange.
	RefreshToken,
}
impl GrantType {
	/// Wire label for the grant.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::Password => "password",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_unknown_transport_error(meta),
		}
	}
}

/// [`TokenExchange`] speaking the Mashery V3 OAuth dialect.
///
/// The package key and secret authenticate the client with HTTP Basic; the area UUID is sent
/// as the scope of both the password and the refresh-token grants.
pub struct MasheryExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoint: MasheryEndpoint,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> MasheryExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an exchange that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		endpoint: MasheryEndpoint,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self { endpoint, http_client: http_client.into(), error_mapper: error_mapper.into() }
	}

	/// Endpoint this exchange talks to.
	pub fn endpoint(&self) -> &MasheryEndpoint {
		&self.endpoint
	}

	fn oauth_client(&self, credentials: &V3Credentials) -> Result<ConfiguredBasicClient> {
		let token_url = TokenUrl::new(self.endpoint.token.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Ok(BasicClient::new(ClientId::new(credentials.api_key.clone()))
			.set_client_secret(ClientSecret::new(credentials.api_secret.expose().to_owned()))
			.set_token_uri(token_url))
	}
}
#[cfg(feature = "reqwest")]
impl MasheryExchange<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an exchange with its own reqwest transport.
	pub fn new(endpoint: MasheryEndpoint) -> Self {
		Self::with_http_client(
			endpoint,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> TokenExchange for MasheryExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_credentials<'a>(
		&'a self,
		credentials: &'a V3Credentials,
	) -> ExchangeFuture<'a, AccessGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let client = self.oauth_client(credentials)?;
			let instrumented = self.http_client.with_metadata(meta.clone());
			let username = ResourceOwnerUsername::new(credentials.username.clone());
			let password = ResourceOwnerPassword::new(credentials.password.expose().to_owned());
			let response = client
				.exchange_password(&username, &password)
				.add_scope(Scope::new(credentials.area_id.clone()))
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						GrantType::Password,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			map_token_response(response)
		})
	}

	fn exchange_refresh_token<'a>(
		&'a self,
		credentials: &'a V3Credentials,
		refresh_token: &'a str,
	) -> ExchangeFuture<'a, AccessGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let client = self.oauth_client(credentials)?;
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = client
				.exchange_refresh_token(&refresh_secret)
				.add_scope(Scope::new(credentials.area_id.clone()))
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						GrantType::RefreshToken,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			map_token_response(response)
		})
	}
}
impl<C, M> Debug for MasheryExchange<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MasheryExchange").field("endpoint", &self.endpoint.token.as_str()).finish()
	}
}

fn map_token_response(response: FacadeTokenResponse) -> Result<AccessGrant> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	Ok(AccessGrant::new(
		response.access_token().secret().to_owned(),
		response.refresh_token().map(|token| token.secret().to_owned()),
		expires_in,
	))
}

fn map_request_error<E, M>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message: format!("Token endpoint returned an unexpected response: {message}."),
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let message = if let Some(description) = response.error_description() {
		format!("Token endpoint returned an OAuth error: {description}")
	} else {
		format!("Token endpoint returned an OAuth error: {}", response.error().as_ref())
	};

	match response.error() {
		BasicErrorResponseType::InvalidGrant => Error::InvalidGrant { reason: message },
		BasicErrorResponseType::InvalidClient | BasicErrorResponseType::UnauthorizedClient =>
			Error::InvalidClient { reason: message },
		_ => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	grant: GrantType,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: format!("Request timed out during the {grant} exchange"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_unknown_transport_error(meta: Option<&ResponseMetadata>) -> Error {
	TransientError::TokenEndpoint {
		message: "HTTP client error occurred while calling the token endpoint".into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
