//! Host adapter: routes path-addressed requests onto [`Broker`] operations.
//!
//! Three path families are served:
//!
//! - `credentials/<name>`: write-only credential records (create, update, delete).
//! - `auth/<name>/v2`: read a V2 signature, leased for a minute and never renewed.
//! - `auth/<name>/v3`: read a V3 access token under a renewable lease.
//!
//! Renew and revoke carry the [`SecretResponse`] from the original read instead of a path.

// crates.io
use serde::Deserializer;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{AreaName, CredentialFields},
	error::{LeaseError, RequestError, ValidationError},
	flows::Broker,
	lease::LeaseOptions,
};

/// Operations a host may invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
	/// Read a path.
	Read,
	/// Write a path that does not exist yet.
	Create,
	/// Write a path that already exists.
	Update,
	/// Delete a path.
	Delete,
	/// Extend a previously issued secret.
	Renew,
	/// Tear down a previously issued secret.
	Revoke,
}
impl Operation {
	/// Stable label used in errors.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::Read => "read",
			Operation::Create => "create",
			Operation::Update => "update",
			Operation::Delete => "delete",
			Operation::Renew => "renew",
			Operation::Revoke => "revoke",
		}
	}
}

/// Kinds of leased secrets the backend issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
	/// V2 signature.
	V2Access,
	/// V3 access token.
	V3Access,
}
impl SecretKind {
	/// Wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			SecretKind::V2Access => "v2_access",
			SecretKind::V3Access => "v3_access",
		}
	}
}

/// Leased secret attached to a response and handed back on renew or revoke.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretResponse {
	/// Secret kind.
	pub kind: SecretKind,
	/// Sealed internal state; absent for V2 signatures.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub internal: Option<String>,
	/// Lease bounds.
	pub lease: LeaseOptions,
}

/// Request from the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
	/// Requested operation.
	pub operation: Operation,
	/// Path relative to the backend mount; ignored for renew and revoke.
	#[serde(default)]
	pub path: String,
	/// Request fields.
	#[serde(default)]
	pub data: Map<String, Value>,
	/// Previously issued secret, for renew and revoke.
	#[serde(default)]
	pub secret: Option<SecretResponse>,
}
impl Request {
	/// Builds a request without data.
	pub fn new(operation: Operation, path: impl Into<String>) -> Self {
		Self { operation, path: path.into(), data: Map::new(), secret: None }
	}

	/// Attaches request fields.
	pub fn with_data(mut self, data: Map<String, Value>) -> Self {
		self.data = data;

		self
	}

	/// Attaches a previously issued secret.
	pub fn with_secret(mut self, secret: SecretResponse) -> Self {
		self.secret = Some(secret);

		self
	}
}

/// Response to the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// Caller-visible fields.
	pub data: Map<String, Value>,
	/// Leased secret, when the operation issued or renewed one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secret: Option<SecretResponse>,
}

/// Help for one path family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathHelp {
	/// Path pattern.
	pub pattern: &'static str,
	/// One-line summary.
	pub synopsis: &'static str,
	/// Long description.
	pub description: &'static str,
}

/// Backend-level help text.
pub const BACKEND_HELP: &str =
	"Issues Mashery V2 signatures and V3 access tokens from stored area credentials.";

static PATH_HELP: [PathHelp; 3] = [
	PathHelp {
		pattern: "credentials/<name>",
		synopsis: "Stores Mashery area credentials.",
		description: "\
Write-only storage for the credentials behind V2 signatures and V3 access tokens. Fields:
area_id (V3), area_nid (V2), api_key and secret (both), username and password (V3), qps
(default 2) and lease_duration (V3, default 15 minutes). Supply only what the intended
artifacts need. Writing an existing name merges the supplied fields into the stored record.

Use descriptive names such as `test`, `prod-ci_cd-pipeline`, or `prod-oauth-server`; tooling
refers to credentials by this name only.",
	},
	PathHelp {
		pattern: "auth/<name>/v2",
		synopsis: "Issues a Mashery V2 signature.",
		description: "\
Returns the area numeric id, the package key, the advisory qps, and a signature of the key
secret salted with the current second. The gateway accepts a signature for a few minutes at
most, so the lease lasts one minute and cannot be renewed. Revocation does nothing.",
	},
	PathHelp {
		pattern: "auth/<name>/v3",
		synopsis: "Issues a Mashery V3 access token.",
		description: "\
Returns an access token and the advisory qps for the area. The credentials must include the
area id, package key and secret, username, and password.

Upstream tokens live for at most an hour. The lease lasts for the area's lease_duration or
the token's remaining life, whichever is shorter, and renewals never outlive the token.
Revoking the lease invalidates the token upstream.",
	},
];

/// Path families served by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
	/// `credentials/<name>`
	Credentials(AreaName),
	/// `auth/<name>/v2`
	V2(AreaName),
	/// `auth/<name>/v3`
	V3(AreaName),
}
impl Route {
	/// Matches `path` against the served patterns.
	pub fn parse(path: &str) -> Result<Self, RequestError> {
		let unknown = || RequestError::UnknownPath { path: path.to_owned() };
		let path = path.trim_matches('/');
		let segments = path.split('/').collect::<Vec<_>>();
		let name = |raw: &str| AreaName::new(raw).map_err(|_| unknown());

		match segments.as_slice() {
			["credentials", area] => Ok(Self::Credentials(name(*area)?)),
			["auth", area, "v2"] => Ok(Self::V2(name(*area)?)),
			["auth", area, "v3"] => Ok(Self::V3(name(*area)?)),
			_ => Err(unknown()),
		}
	}

	/// Help for this route's path family.
	pub fn help(&self) -> &'static PathHelp {
		match self {
			Route::Credentials(_) => &PATH_HELP[0],
			Route::V2(_) => &PATH_HELP[1],
			Route::V3(_) => &PATH_HELP[2],
		}
	}
}

/// Request router over a [`Broker`].
#[derive(Clone, Debug)]
pub struct Backend {
	broker: Broker,
}
impl Backend {
	/// Wraps a broker.
	pub fn new(broker: Broker) -> Self {
		Self { broker }
	}

	/// Underlying broker.
	pub fn broker(&self) -> &Broker {
		&self.broker
	}

	/// Help for every path family.
	pub fn paths() -> &'static [PathHelp] {
		&PATH_HELP
	}

	/// Help for the path family matching `path`.
	pub fn help(path: &str) -> Result<&'static PathHelp> {
		Ok(Route::parse(path)?.help())
	}

	/// Returns `true` when `path` names a stored credential record.
	pub async fn existence_check(&self, path: &str) -> Result<bool> {
		match Route::parse(path)? {
			Route::Credentials(area) => self.broker.store.exists(&area).await,
			_ => Ok(false),
		}
	}

	/// Handles one request.
	pub async fn handle(&self, request: Request) -> Result<Response> {
		let Request { operation, path, data, secret } = request;

		match operation {
			Operation::Renew => self.renew(secret.ok_or(RequestError::MissingSecret)?).await,
			Operation::Revoke => self.revoke(secret.ok_or(RequestError::MissingSecret)?).await,
			_ => self.route(operation, &path, data).await,
		}
	}

	async fn route(
		&self,
		operation: Operation,
		path: &str,
		data: Map<String, Value>,
	) -> Result<Response> {
		let unsupported = || RequestError::UnsupportedOperation {
			operation: operation.as_str(),
			path: path.to_owned(),
		};

		match (Route::parse(path)?, operation) {
			(Route::Credentials(area), Operation::Create | Operation::Update) => {
				self.broker.write_credentials(&area, parse_fields(data)?).await?;

				Ok(Response::default())
			},
			(Route::Credentials(area), Operation::Delete) => {
				self.broker.delete_credentials(&area).await?;

				Ok(Response::default())
			},
			(Route::V2(area), Operation::Read) => {
				let issued = self.broker.issue_v2(&area).await?;
				let signature = issued.signature;
				let mut data = Map::new();

				data.insert("area_nid".into(), signature.area_nid.into());
				data.insert("api_key".into(), signature.api_key.into());
				data.insert("sig".into(), signature.signed_secret.into());
				data.insert("qps".into(), signature.max_qps.into());

				Ok(Response {
					data,
					secret: Some(SecretResponse {
						kind: SecretKind::V2Access,
						internal: None,
						lease: issued.lease,
					}),
				})
			},
			(Route::V3(area), Operation::Read) => {
				let issued = self.broker.acquire_v3(&area).await?;
				let mut data = Map::new();

				data.insert("access_token".into(), issued.access_token.expose().into());
				data.insert("qps".into(), issued.max_qps.into());

				Ok(Response {
					data,
					secret: Some(SecretResponse {
						kind: SecretKind::V3Access,
						internal: Some(issued.sealed_state),
						lease: issued.lease,
					}),
				})
			},
			_ => Err(unsupported().into()),
		}
	}

	async fn renew(&self, secret: SecretResponse) -> Result<Response> {
		match secret.kind {
			SecretKind::V2Access =>
				Err(LeaseError::NotRenewable { kind: SecretKind::V2Access.as_str() }.into()),
			SecretKind::V3Access => {
				let internal = secret
					.internal
					.as_deref()
					.ok_or(LeaseError::InvalidState { reason: "missing internal state" })?;
				let ttl = self.broker.renew_v3(internal).await?;

				Ok(Response {
					data: Map::new(),
					secret: Some(SecretResponse {
						lease: LeaseOptions { ttl, ..secret.lease },
						..secret
					}),
				})
			},
		}
	}

	async fn revoke(&self, secret: SecretResponse) -> Result<Response> {
		if let (SecretKind::V3Access, Some(internal)) = (secret.kind, secret.internal.as_deref()) {
			self.broker.revoke_v3(internal).await;
		}

		Ok(Response::default())
	}
}

#[derive(Debug, Deserialize)]
struct RawFields {
	area_id: Option<String>,
	area_nid: Option<i64>,
	api_key: Option<String>,
	secret: Option<String>,
	username: Option<String>,
	password: Option<String>,
	qps: Option<i64>,
	#[serde(default, deserialize_with = "deserialize_lease_duration")]
	lease_duration: Option<i64>,
}

/// Decodes request data into credential fields, naming the offending field on failure.
pub fn parse_fields(data: Map<String, Value>) -> Result<CredentialFields, ValidationError> {
	let raw: RawFields = serde_path_to_error::deserialize(Value::Object(data)).map_err(|e| {
		ValidationError::InvalidField { field: e.path().to_string(), reason: e.inner().to_string() }
	})?;
	let fields = CredentialFields {
		area_id: raw.area_id,
		area_nid: raw.area_nid,
		api_key: raw.api_key,
		secret: raw.secret,
		username: raw.username,
		password: raw.password,
		qps: raw.qps,
		lease_duration: raw.lease_duration,
	};

	fields.validate()?;

	Ok(fields)
}

fn deserialize_lease_duration<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Input {
		Seconds(i64),
		Text(String),
	}

	match Option::<Input>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Input::Seconds(secs)) => Ok(Some(secs)),
		Some(Input::Text(text)) => parse_duration_secs(&text).map(Some).map_err(|reason| {
			serde::de::Error::custom(format!("`{text}` is not a duration: {reason}"))
		}),
	}
}

/// Parses `"90"`, `"90s"`, `"15m"`, `"1h30m"`, or `"2d"` into whole seconds.
fn parse_duration_secs(text: &str) -> Result<i64, &'static str> {
	let text = text.trim();

	if text.is_empty() {
		return Err("empty value");
	}
	if let Ok(secs) = text.parse::<i64>() {
		return Ok(secs);
	}

	let mut total = 0_i64;
	let mut digits = String::new();

	for ch in text.chars() {
		if ch.is_ascii_digit() {
			digits.push(ch);

			continue;
		}

		let unit = match ch {
			's' => 1,
			'm' => 60,
			'h' => 60 * 60,
			'd' => 24 * 60 * 60,
			_ => return Err("unknown unit"),
		};
		let value = digits.parse::<i64>().map_err(|_| "missing number before unit")?;

		total = value
			.checked_mul(unit)
			.and_then(|secs| total.checked_add(secs))
			.ok_or("value out of range")?;
		digits.clear();
	}

	if !digits.is_empty() {
		return Err("missing unit after number");
	}

	Ok(total)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn data(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => panic!("Fixture should be a JSON object."),
		}
	}

	#[test]
	fn routes_match_served_patterns() {
		assert!(matches!(Route::parse("credentials/prod"), Ok(Route::Credentials(_))));
		assert!(matches!(Route::parse("auth/prod-ci_cd@x.y/v2"), Ok(Route::V2(_))));
		assert!(matches!(Route::parse("/auth/prod/v3/"), Ok(Route::V3(_))));

		for path in ["auth/prod/v4", "credentials", "credentials/-bad", "auth//v2", "other/prod"] {
			assert!(
				matches!(Route::parse(path), Err(RequestError::UnknownPath { .. })),
				"{path} should not route"
			);
		}
	}

	#[test]
	fn help_is_available_per_family() {
		assert_eq!(Backend::paths().len(), 3);
		assert_eq!(
			Backend::help("auth/prod/v3").expect("Path should route.").pattern,
			"auth/<name>/v3"
		);
		assert!(Backend::help("nope").is_err());
	}

	#[test]
	fn fields_parse_with_duration_strings() {
		let fields = parse_fields(data(serde_json::json!({
			"area_id": "a",
			"area_nid": 100,
			"qps": 5,
			"lease_duration": "15m",
			"unrelated": true,
		})))
		.expect("Fields should parse.");

		assert_eq!(fields.area_id.as_deref(), Some("a"));
		assert_eq!(fields.area_nid, Some(100));
		assert_eq!(fields.qps, Some(5));
		assert_eq!(fields.lease_duration, Some(900));
		assert_eq!(fields.username, None);

		let fields = parse_fields(data(serde_json::json!({ "lease_duration": 300 })))
			.expect("Integer durations should parse.");

		assert_eq!(fields.lease_duration, Some(300));
	}

	#[test]
	fn mistyped_fields_are_named() {
		let err = parse_fields(data(serde_json::json!({ "area_nid": "one hundred" })))
			.expect_err("A string area_nid should be rejected.");

		assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "area_nid"));

		let err = parse_fields(data(serde_json::json!({ "qps": -3 })))
			.expect_err("Negative qps should be rejected.");

		assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "qps"));
	}

	#[test]
	fn duration_strings_cover_units() {
		assert_eq!(parse_duration_secs("90"), Ok(90));
		assert_eq!(parse_duration_secs("90s"), Ok(90));
		assert_eq!(parse_duration_secs("1h"), Ok(3600));
		assert_eq!(parse_duration_secs("1h30m"), Ok(5400));
		assert_eq!(parse_duration_secs("2d"), Ok(172_800));
		assert!(parse_duration_secs("").is_err());
		assert!(parse_duration_secs("m").is_err());
		assert!(parse_duration_secs("10").is_ok());
		assert!(parse_duration_secs("10x").is_err());
		assert!(parse_duration_secs("10m5").is_err());
	}
}
