// std
use std::time::Duration as StdDuration;
// crates.io
use tokio_util::sync::CancellationToken;
// self
use adx_token_broker::{
	_preludet::*,
	auth::ScopeSet,
	cache::SingleFlightCache,
	context::{IncomingRequest, RequestContext, UserContext, UserIdentity},
	error::ContextError,
	service::{AcquisitionMode, CredentialService},
};

fn scopes() -> ScopeSet {
	ScopeSet::new(["https://kusto.kusto.windows.net/.default"])
		.expect("Scope fixture should be valid.")
}

fn services(
	service_identity: &Arc<ScriptedProvider>,
	on_behalf_of: &Arc<ScriptedProvider>,
) -> CredentialService {
	CredentialService::new(service_identity.clone(), scopes(), Arc::new(SingleFlightCache::new()))
		.with_on_behalf_of(on_behalf_of.clone())
}

fn signed_in(login: &str, id_token: &str) -> RequestContext {
	RequestContext::new()
		.with_user(UserContext::for_user(UserIdentity::new(login)).with_id_token(id_token))
}

#[tokio::test]
async fn service_identity_ignores_the_caller() {
	let service_identity = Arc::new(ScriptedProvider::issuing("app-token", Duration::hours(1)));
	let on_behalf_of = Arc::new(ScriptedProvider::issuing("user-token", Duration::hours(1)));
	let service =
		services(&service_identity, &on_behalf_of).with_mode(AcquisitionMode::ServiceIdentity);

	for ctx in [RequestContext::new(), signed_in("alice", "id-1"), signed_in("bob", "id-2")] {
		let token = service.acquire_request_token(&ctx).await.expect("Service token should issue.");

		assert_eq!(token.expose(), "Bearer app-token");
	}

	assert_eq!(service_identity.calls(), 1);
	assert_eq!(on_behalf_of.calls(), 0);
}

#[tokio::test]
async fn service_tokens_are_returned_without_a_scheme() {
	let service_identity = Arc::new(ScriptedProvider::issuing("app-token", Duration::hours(1)));
	let on_behalf_of = Arc::new(ScriptedProvider::issuing("user-token", Duration::hours(1)));
	let service = services(&service_identity, &on_behalf_of);
	let token = service
		.acquire_service_token(&signed_in("alice", "id-1"))
		.await
		.expect("Service token should issue.");

	assert_eq!(token.expose(), "app-token");
	assert_eq!(on_behalf_of.calls(), 0);
}

#[tokio::test]
async fn on_behalf_of_needs_a_signed_in_user() {
	let service_identity = Arc::new(ScriptedProvider::issuing("app-token", Duration::hours(1)));
	let on_behalf_of = Arc::new(ScriptedProvider::issuing("user-token", Duration::hours(1)));
	let service = services(&service_identity, &on_behalf_of);
	let missing = service
		.acquire_request_token(&RequestContext::new())
		.await
		.expect_err("Requests without a user context should fail.");
	let system_ctx = RequestContext::new().with_user_from_request(&IncomingRequest::new());
	let system = service
		.acquire_request_token(&system_ctx)
		.await
		.expect_err("System requests should fail.");

	assert!(matches!(missing, Error::Context(ContextError::MissingUserContext)));
	assert_eq!(missing.to_string(), "User context not configured.");
	assert!(matches!(system, Error::Context(ContextError::NonUserRequest)));
	assert_eq!(service_identity.calls() + on_behalf_of.calls(), 0);
}

#[tokio::test]
async fn each_id_token_gets_its_own_exchange() {
	let service_identity = Arc::new(ScriptedProvider::issuing("app-token", Duration::hours(1)));
	let on_behalf_of = Arc::new(ScriptedProvider::issuing("user-token", Duration::hours(1)));
	let service = services(&service_identity, &on_behalf_of);

	for ctx in [signed_in("alice", "id-1"), signed_in("bob", "id-2"), signed_in("alice", "id-1")] {
		service.acquire_request_token(&ctx).await.expect("Exchange should succeed.");
	}

	assert_eq!(on_behalf_of.assertions(), vec!["id-1".to_owned(), "id-2".to_owned()]);
}

#[tokio::test]
async fn disposing_forgets_cached_tokens() {
	let service_identity = Arc::new(ScriptedProvider::issuing("app-token", Duration::hours(1)));
	let on_behalf_of = Arc::new(ScriptedProvider::issuing("user-token", Duration::hours(1)));
	let service = services(&service_identity, &on_behalf_of);
	let ctx = signed_in("alice", "id-1");

	service.acquire_request_token(&ctx).await.expect("First exchange should succeed.");
	service.dispose();
	service.acquire_request_token(&ctx).await.expect("Second exchange should succeed.");

	assert_eq!(on_behalf_of.calls(), 2);
}

#[tokio::test]
async fn cancelled_requests_stop_waiting() {
	let service_identity = Arc::new(ScriptedProvider::issuing("app-token", Duration::hours(1)));
	let on_behalf_of = Arc::new(
		ScriptedProvider::issuing("user-token", Duration::hours(1))
			.with_delay(StdDuration::from_secs(5)),
	);
	let service = services(&service_identity, &on_behalf_of);
	let cancellation = CancellationToken::new();
	let ctx = signed_in("alice", "id-1").with_cancellation(cancellation.clone());
	let trigger = async {
		tokio::time::sleep(StdDuration::from_millis(20)).await;
		cancellation.cancel();
	};
	let (outcome, ()) = tokio::join!(service.acquire_request_token(&ctx), trigger);

	assert!(matches!(outcome, Err(Error::Cancelled)));
}

#[tokio::test]
async fn deadlines_on_the_request_are_honored() {
	let service_identity = Arc::new(
		ScriptedProvider::issuing("app-token", Duration::hours(1))
			.with_delay(StdDuration::from_secs(5)),
	);
	let on_behalf_of = Arc::new(ScriptedProvider::issuing("user-token", Duration::hours(1)));
	let service = services(&service_identity, &on_behalf_of);
	let ctx = RequestContext::new().with_timeout(StdDuration::from_millis(20));
	let err = service
		.acquire_service_token(&ctx)
		.await
		.expect_err("Slow service exchanges should time out.");

	assert!(err.is_interrupted());
	assert_eq!(err.to_string(), "Token acquisition timed out.");
}
