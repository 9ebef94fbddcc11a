//! Credential service choosing between service-identity and on-behalf-of acquisition.
//!
//! [`CredentialService`] is built once per data-source instance. For every request it decides
//! which identity the downstream call runs as, pulls the caller's ID token out of the
//! [`RequestContext`], and routes the exchange through the shared [`SingleFlightCache`] so
//! concurrent requests for one session trigger at most one identity-provider call.
//!
//! On-behalf-of failures are logged in full server-side and surface to callers only as
//! [`Error::UserTokenUnavailable`], which names the login and nothing else.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	cache::{CacheKey, SingleFlightCache},
	context::RequestContext,
	error::ContextError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{OnBehalfOfClient, ServiceTokenProvider},
};
#[cfg(feature = "reqwest")]
use crate::{config::CredentialSettings, http::ReqwestHttpClient, oauth::EntraIdClient};

/// Identity used for downstream calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode {
	/// Every request runs as the data source's service principal.
	#[default]
	#[serde(rename = "clientsecret")]
	ServiceIdentity,
	/// User requests run as the signed-in user through the on-behalf-of exchange.
	#[serde(rename = "clientsecret-obo")]
	OnBehalfOf,
}
impl AcquisitionMode {
	/// Returns the settings label of this mode.
	pub const fn as_str(self) -> &'static str {
		match self {
			AcquisitionMode::ServiceIdentity => "clientsecret",
			AcquisitionMode::OnBehalfOf => "clientsecret-obo",
		}
	}
}
impl Display for AcquisitionMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Hands out bearer tokens for outbound cluster requests.
#[derive(Clone)]
pub struct CredentialService {
	mode: AcquisitionMode,
	scopes: ScopeSet,
	query_timeout: Option<StdDuration>,
	cache: Arc<SingleFlightCache>,
	service_provider: Arc<dyn ServiceTokenProvider>,
	on_behalf_of: Option<Arc<dyn OnBehalfOfClient>>,
}
impl CredentialService {
	/// Creates a service-identity service requesting `scopes` and caching into `cache`.
	pub fn new(
		service_provider: Arc<dyn ServiceTokenProvider>,
		scopes: ScopeSet,
		cache: Arc<SingleFlightCache>,
	) -> Self {
		Self {
			mode: AcquisitionMode::ServiceIdentity,
			scopes,
			query_timeout: None,
			cache,
			service_provider,
			on_behalf_of: None,
		}
	}

	/// Switches to on-behalf-of acquisition through `client`.
	pub fn with_on_behalf_of(mut self, client: Arc<dyn OnBehalfOfClient>) -> Self {
		self.mode = AcquisitionMode::OnBehalfOf;
		self.on_behalf_of = Some(client);

		self
	}

	/// Overrides the acquisition mode.
	///
	/// Selecting [`AcquisitionMode::OnBehalfOf`] without an on-behalf-of client keeps every
	/// request on the service identity.
	pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
		self.mode = mode;

		self
	}

	/// Bounds every acquisition, including time spent queued behind another caller.
	pub fn with_query_timeout(mut self, timeout: StdDuration) -> Self {
		self.query_timeout = Some(timeout);

		self
	}

	/// Configured acquisition mode.
	pub fn mode(&self) -> AcquisitionMode {
		self.mode
	}

	/// Scopes requested for the cluster.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Configured acquisition bound.
	pub fn query_timeout(&self) -> Option<StdDuration> {
		self.query_timeout
	}

	/// Acquires the service identity's raw access token; also used by health checks.
	pub async fn acquire_service_token(&self, ctx: &RequestContext) -> Result<TokenSecret> {
		let ctx = self.bounded(ctx);

		observe(FlowKind::ServiceIdentity, "acquire_service_token", ctx.run(self.service_token()))
			.await
	}

	/// Acquires an `Authorization` header value for the downstream call serving `ctx`.
	pub async fn acquire_request_token(&self, ctx: &RequestContext) -> Result<TokenSecret> {
		const STAGE: &str = "acquire_request_token";

		let ctx = self.bounded(ctx);
		let token = match self.on_behalf_of_client() {
			Some(client) => {
				obs::record_strategy(FlowKind::OnBehalfOf);

				observe(FlowKind::OnBehalfOf, STAGE, ctx.run(self.user_token(client, &ctx))).await?
			},
			None => {
				obs::record_strategy(FlowKind::ServiceIdentity);

				observe(FlowKind::ServiceIdentity, STAGE, ctx.run(self.service_token())).await?
			},
		};

		Ok(token.bearer())
	}

	/// Releases cached tokens; call when the owning data source is disposed.
	pub fn dispose(&self) {
		self.cache.purge();
	}

	fn on_behalf_of_client(&self) -> Option<&dyn OnBehalfOfClient> {
		match self.mode {
			AcquisitionMode::OnBehalfOf => self.on_behalf_of.as_deref(),
			AcquisitionMode::ServiceIdentity => None,
		}
	}

	fn bounded(&self, ctx: &RequestContext) -> RequestContext {
		match self.query_timeout {
			Some(timeout) => ctx.clone().with_timeout(timeout),
			None => ctx.clone(),
		}
	}

	async fn service_token(&self) -> Result<TokenSecret> {
		let key = CacheKey::for_service(&self.scopes);

		self.cache
			.get_or_set(&key, |_| self.service_provider.acquire_service_token(&self.scopes))
			.await
	}

	async fn user_token(
		&self,
		client: &dyn OnBehalfOfClient,
		ctx: &RequestContext,
	) -> Result<TokenSecret> {
		let user = ctx.user().ok_or(ContextError::MissingUserContext)?;
		let identity = user.identity.as_ref().ok_or(ContextError::NonUserRequest)?;
		let id_token = user.id_token.as_ref().ok_or(ContextError::MissingIdToken)?;
		let key = CacheKey::for_id_token(id_token);
		let outcome = self
			.cache
			.get_or_set(&key, |_| {
				client.acquire_token_on_behalf_of(id_token.expose(), &self.scopes)
			})
			.await;

		outcome.map_err(|err| {
			if err.is_interrupted() {
				return err;
			}

			obs::record_exchange_failure(&identity.login, &err);

			Error::UserTokenUnavailable { login: identity.login.clone() }
		})
	}
}
#[cfg(feature = "reqwest")]
impl CredentialService {
	/// Builds a service from data-source settings using the default reqwest transport.
	pub fn from_settings(
		settings: &CredentialSettings,
		cache: Arc<SingleFlightCache>,
	) -> Result<Self> {
		Self::from_settings_with_http_client(settings, cache, ReqwestHttpClient::default())
	}

	/// Builds a service from data-source settings, sending exchanges through `http_client`.
	pub fn from_settings_with_http_client(
		settings: &CredentialSettings,
		cache: Arc<SingleFlightCache>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let cloud = settings.cloud()?;
		let scopes = cloud.adx_scopes(settings.cluster_url.trim())?;
		let client = Arc::new(EntraIdClient::new(
			&cloud,
			settings.tenant()?,
			settings.client()?,
			settings.secret()?.expose(),
			http_client,
		)?);
		let mut service = Self::new(client.clone(), scopes, cache);

		if settings.azure_auth_type == AcquisitionMode::OnBehalfOf {
			service = service.with_on_behalf_of(client);
		}
		if let Some(timeout) = settings.query_timeout()? {
			service = service.with_query_timeout(timeout);
		}

		Ok(service)
	}
}
impl Debug for CredentialService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialService")
			.field("mode", &self.mode)
			.field("scopes", &self.scopes)
			.field("query_timeout", &self.query_timeout)
			.field("on_behalf_of_configured", &self.on_behalf_of.is_some())
			.finish()
	}
}

async fn observe<F>(kind: FlowKind, stage: &'static str, fut: F) -> Result<TokenSecret>
where
	F: Future<Output = Result<TokenSecret>>,
{
	let span = FlowSpan::new(kind, stage);

	obs::record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::ScriptedProvider,
		context::{UserContext, UserIdentity},
	};

	fn scopes() -> ScopeSet {
		ScopeSet::new(["https://kusto.kusto.windows.net/.default"])
			.expect("Scope fixture should be valid.")
	}

	fn on_behalf_of_service(provider: Arc<ScriptedProvider>) -> CredentialService {
		CredentialService::new(provider.clone(), scopes(), Default::default())
			.with_on_behalf_of(provider)
	}

	fn alice(id_token: &str) -> RequestContext {
		RequestContext::new()
			.with_user(UserContext::for_user(UserIdentity::new("alice")).with_id_token(id_token))
	}

	#[tokio::test]
	async fn service_identity_ignores_user_context() {
		let provider = Arc::new(ScriptedProvider::issuing("svc", Duration::hours(1)));
		let service = CredentialService::new(provider.clone(), scopes(), Default::default());
		let token = service
			.acquire_request_token(&RequestContext::new())
			.await
			.expect("Service identity should not need a user.");

		assert_eq!(token.expose(), "Bearer svc");
		assert!(provider.assertions().is_empty());
	}

	#[tokio::test]
	async fn on_behalf_of_mode_without_a_client_falls_back() {
		let provider = Arc::new(ScriptedProvider::issuing("svc", Duration::hours(1)));
		let service = CredentialService::new(provider.clone(), scopes(), Default::default())
			.with_mode(AcquisitionMode::OnBehalfOf);
		let token = service
			.acquire_request_token(&RequestContext::new())
			.await
			.expect("Missing on-behalf-of client should fall back to the service identity.");

		assert_eq!(token.expose(), "Bearer svc");
	}

	#[tokio::test]
	async fn context_checks_run_in_order() {
		let provider = Arc::new(ScriptedProvider::issuing("user", Duration::hours(1)));
		let service = on_behalf_of_service(provider.clone());
		let missing_user = service.acquire_request_token(&RequestContext::new()).await;
		let system = service
			.acquire_request_token(&RequestContext::new().with_user(UserContext::default()))
			.await;
		let no_token = service
			.acquire_request_token(
				&RequestContext::new().with_user(UserContext::for_user(UserIdentity::new("alice"))),
			)
			.await;

		assert!(matches!(missing_user, Err(Error::Context(ContextError::MissingUserContext))));
		assert!(matches!(system, Err(Error::Context(ContextError::NonUserRequest))));
		assert!(matches!(no_token, Err(Error::Context(ContextError::MissingIdToken))));
		assert_eq!(provider.calls(), 0);
	}

	#[tokio::test]
	async fn exchanges_are_cached_per_id_token() {
		let provider = Arc::new(ScriptedProvider::issuing("user", Duration::hours(1)));
		let service = on_behalf_of_service(provider.clone());

		for ctx in [alice("id-1"), alice("id-1"), alice("id-2")] {
			let token =
				service.acquire_request_token(&ctx).await.expect("Exchange should succeed.");

			assert_eq!(token.expose(), "Bearer user");
		}

		assert_eq!(provider.assertions(), vec!["id-1".to_owned(), "id-2".to_owned()]);
	}

	#[tokio::test(start_paused = true)]
	async fn timeouts_are_not_masked() {
		let provider = Arc::new(
			ScriptedProvider::issuing("user", Duration::hours(1))
				.with_delay(StdDuration::from_secs(10)),
		);
		let service =
			on_behalf_of_service(provider).with_query_timeout(StdDuration::from_millis(100));
		let outcome = service.acquire_request_token(&alice("id-1")).await;

		assert!(matches!(outcome, Err(Error::TimedOut)));
	}

	#[tokio::test]
	async fn dispose_forces_a_fresh_exchange() {
		let provider = Arc::new(ScriptedProvider::issuing("user", Duration::hours(1)));
		let service = on_behalf_of_service(provider.clone());

		service.acquire_request_token(&alice("id-1")).await.expect("First exchange should succeed.");
		service.dispose();
		service.acquire_request_token(&alice("id-1")).await.expect("Second exchange should succeed.");

		assert_eq!(provider.calls(), 2);
	}
}
