// crates.io
use serde_json::{Map, Value, json};
// self
use mashery_broker::{
	_preludet::*,
	backend::{Backend, Operation, Request, SecretKind},
	error::{LeaseError, RequestError, ValidationError},
};

fn object(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => panic!("Fixture should be a JSON object."),
	}
}

fn backend(exchange: FakeExchange) -> (Backend, Arc<FakeExchange>) {
	let exchange = Arc::new(exchange);
	let (broker, _) = build_test_broker(exchange.clone());

	(Backend::new(broker), exchange)
}

async fn store_credentials(backend: &Backend, name: &str, data: Value) {
	let path = format!("credentials/{name}");
	let operation = if backend.existence_check(&path).await.expect("Existence check should succeed.")
	{
		Operation::Update
	} else {
		Operation::Create
	};

	backend
		.handle(Request::new(operation, path).with_data(object(data)))
		.await
		.expect("Credential write should succeed.");
}

#[tokio::test]
async fn credentials_path_is_write_only() {
	let (backend, _) = backend(FakeExchange::default());

	store_credentials(&backend, "prod", json!({ "api_key": "k", "lease_duration": "5m" })).await;

	assert!(backend.existence_check("credentials/prod").await.expect("Check should succeed."));

	let err = backend
		.handle(Request::new(Operation::Read, "credentials/prod"))
		.await
		.expect_err("Reading stored credentials should be refused.");

	assert!(matches!(
		err,
		Error::Request(RequestError::UnsupportedOperation { operation: "read", .. })
	));

	let record = backend
		.broker()
		.read_credentials(&area("prod"))
		.await
		.expect("Read should succeed.")
		.expect("Record should be stored.");

	assert_eq!(record.lease_duration, 300);

	backend
		.handle(Request::new(Operation::Delete, "credentials/prod"))
		.await
		.expect("Delete should succeed.");

	assert!(!backend.existence_check("credentials/prod").await.expect("Check should succeed."));
}

#[tokio::test]
async fn update_keeps_omitted_fields() {
	let (backend, _) = backend(FakeExchange::default());

	store_credentials(
		&backend,
		"prod",
		json!({ "area_nid": 100, "api_key": "k", "secret": "s", "qps": 7 }),
	)
	.await;
	store_credentials(&backend, "prod", json!({ "api_key": "k2" })).await;

	let response = backend
		.handle(Request::new(Operation::Read, "auth/prod/v2"))
		.await
		.expect("V2 read should succeed.");

	assert_eq!(response.data["api_key"], "k2");
	assert_eq!(response.data["qps"], 7);
	assert_eq!(response.data["area_nid"], 100);
}

#[tokio::test]
async fn v2_secret_is_fixed_and_revocation_is_noop() {
	let (backend, _) = backend(FakeExchange::default());

	store_credentials(&backend, "prod", json!({ "area_nid": 100, "api_key": "k", "secret": "s" }))
		.await;

	let response = backend
		.handle(Request::new(Operation::Read, "auth/prod/v2"))
		.await
		.expect("V2 read should succeed.");
	let secret = response.secret.expect("V2 read should attach a secret.");
	let sig = response.data["sig"].as_str().expect("Signature should be a string.");

	assert_eq!(sig.len(), 32);
	assert_eq!(secret.kind, SecretKind::V2Access);
	assert_eq!(secret.lease.ttl, Duration::minutes(1));
	assert!(!secret.lease.renewable);
	assert!(secret.internal.is_none());

	let err = backend
		.handle(Request::new(Operation::Renew, "").with_secret(secret.clone()))
		.await
		.expect_err("V2 secrets cannot be renewed.");

	assert!(matches!(err, Error::Lease(LeaseError::NotRenewable { kind: "v2_access" })));

	let revoked = backend
		.handle(Request::new(Operation::Revoke, "").with_secret(secret))
		.await
		.expect("V2 revocation should be a no-op.");

	assert!(revoked.data.is_empty());
}

#[tokio::test]
async fn v3_secret_renews_within_upstream_expiry_and_revokes() {
	let (backend, exchange) = backend(FakeExchange::granting("v3-access", "v3-refresh", 3600));

	store_credentials(
		&backend,
		"prod",
		json!({
			"area_id": "a",
			"api_key": "k",
			"secret": "s",
			"username": "u",
			"password": "p",
			"lease_duration": 300,
		}),
	)
	.await;

	let response = backend
		.handle(Request::new(Operation::Read, "auth/prod/v3"))
		.await
		.expect("V3 read should succeed.");
	let secret = response.secret.expect("V3 read should attach a secret.");

	assert_eq!(response.data["access_token"], "v3-access");
	assert_eq!(response.data["qps"], 2);
	assert_eq!(response.data.len(), 2, "Internal state must not leak into the response data.");
	assert_eq!(secret.kind, SecretKind::V3Access);
	assert_eq!(secret.lease.ttl, Duration::seconds(300));
	assert_eq!(secret.lease.max_ttl, Duration::hours(1));

	let renewed = backend
		.handle(Request::new(Operation::Renew, "").with_secret(secret.clone()))
		.await
		.expect("Renewal should succeed.")
		.secret
		.expect("Renewal should return the secret.");

	assert_eq!(renewed.lease.ttl, Duration::seconds(300));
	assert_eq!(renewed.lease.max_ttl, secret.lease.max_ttl);
	assert_eq!(renewed.internal, secret.internal, "Internal state is immutable after issuance.");

	backend
		.handle(Request::new(Operation::Revoke, "").with_secret(secret))
		.await
		.expect("Revocation should report success.");

	assert_eq!(exchange.refresh_calls(), vec!["v3-refresh".to_owned()]);
}

#[tokio::test]
async fn v3_revocation_succeeds_when_upstream_rejects() {
	let (backend, exchange) = backend(FakeExchange {
		fail_refresh: true,
		..FakeExchange::granting("v3-access", "v3-refresh", 3600)
	});

	store_credentials(
		&backend,
		"prod",
		json!({ "area_id": "a", "api_key": "k", "secret": "s", "username": "u", "password": "p" }),
	)
	.await;

	let secret = backend
		.handle(Request::new(Operation::Read, "auth/prod/v3"))
		.await
		.expect("V3 read should succeed.")
		.secret
		.expect("V3 read should attach a secret.");

	assert_eq!(secret.lease.ttl, Duration::minutes(15));

	backend
		.handle(Request::new(Operation::Revoke, "").with_secret(secret))
		.await
		.expect("Revocation must not surface upstream failures.");

	assert_eq!(exchange.refresh_calls().len(), 1);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
	let (backend, exchange) = backend(FakeExchange::granting("v3-access", "v3-refresh", 3600));

	assert!(matches!(
		backend.handle(Request::new(Operation::Read, "auth/ghost/v3")).await,
		Err(Error::AreaNotFound { .. })
	));
	assert!(matches!(
		backend.handle(Request::new(Operation::Read, "auth/prod/v9")).await,
		Err(Error::Request(RequestError::UnknownPath { .. }))
	));
	assert!(matches!(
		backend.handle(Request::new(Operation::Renew, "")).await,
		Err(Error::Request(RequestError::MissingSecret))
	));
	assert!(matches!(
		backend
			.handle(
				Request::new(Operation::Create, "credentials/prod")
					.with_data(object(json!({ "qps": "fast" })))
			)
			.await,
		Err(Error::Validation(ValidationError::InvalidField { .. }))
	));

	store_credentials(&backend, "prod", json!({ "api_key": "k", "secret": "s" })).await;

	assert!(matches!(
		backend.handle(Request::new(Operation::Read, "auth/prod/v3")).await,
		Err(Error::Validation(ValidationError::InsufficientV3Data { .. }))
	));
	assert_eq!(exchange.credential_calls(), 0);
}
