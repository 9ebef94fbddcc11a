//! Microsoft Entra ID client implementing both provider seams.
//!
//! Client credentials go through the `oauth2` crate's [`BasicClient`]. The crate has no
//! on-behalf-of grant, so that exchange is posted as a plain form through the same instrumented
//! transport and parsed here. Both paths share expiry validation and error classification.

pub use oauth2;

// std
use std::collections::BTreeMap;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use serde::{Deserializer, de::Error as _};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClientId, ScopeSet, TenantId, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		AzureCloud, EntraIdStrategy, OnBehalfOfClient, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy, ServiceTokenProvider, TokenFuture, TokenGrant,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Token client for one Entra ID application registration.
#[derive(Clone)]
pub struct EntraIdClient {
	oauth_client: ConfiguredBasicClient,
	token_endpoint: Url,
	tenant: TenantId,
	client_id: ClientId,
	client_secret: TokenSecret,
	http_client: ReqwestHttpClient,
	strategy: Arc<dyn ProviderStrategy>,
}
impl EntraIdClient {
	/// Builds a client for `tenant` in `cloud`, authenticating with a client secret.
	pub fn new(
		cloud: &AzureCloud,
		tenant: TenantId,
		client_id: ClientId,
		client_secret: impl Into<String>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let client_secret = TokenSecret::non_empty(client_secret)
			.ok_or(ConfigError::MissingClientSecret)?;
		let token_endpoint = cloud.token_endpoint(&tenant)?;
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidUrl { field: "token endpoint", source })?;
		let oauth_client = BasicClient::new(oauth2::ClientId::new(client_id.to_string()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);

		Ok(Self {
			oauth_client,
			token_endpoint,
			tenant,
			client_id,
			client_secret,
			http_client,
			strategy: Arc::new(EntraIdStrategy),
		})
	}

	/// Replaces the error-classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Token endpoint every exchange is sent to.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Tenant the application is registered in.
	pub fn tenant(&self) -> &TenantId {
		&self.tenant
	}

	/// Application (client) identifier.
	pub fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	async fn exchange_on_behalf_of(
		&self,
		user_assertion: &str,
		scopes: &ScopeSet,
	) -> Result<AccessToken> {
		const GRANT: TokenGrant = TokenGrant::OnBehalfOf;

		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let mut form = BTreeMap::from([
			("grant_type".to_owned(), GRANT.as_str().to_owned()),
			("client_id".to_owned(), self.client_id.to_string()),
			("client_secret".to_owned(), self.client_secret.expose().to_owned()),
			("assertion".to_owned(), user_assertion.to_owned()),
			("scope".to_owned(), scopes.joined()),
			("requested_token_use".to_owned(), "on_behalf_of".to_owned()),
		]);

		self.strategy.augment_token_request(GRANT, &mut form);

		let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(&form).finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.token_endpoint.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;
		let response = instrumented
			.call(request)
			.await
			.map_err(|err| map_transport_error(meta.take().as_ref(), err))?;
		let meta = meta.take();
		let status = response.status();

		if !status.is_success() {
			return Err(map_error_body(
				self.strategy.as_ref(),
				GRANT,
				meta.as_ref(),
				response.body(),
			));
		}

		let deserializer = &mut serde_json::Deserializer::from_slice(response.body());
		let payload: OnBehalfOfResponse = serde_path_to_error::deserialize(deserializer)
			.map_err(|err| TransientError::token_response_parse(err, Some(status.as_u16())))?;
		issued_token(payload.access_token, payload.expires_in)
	}

	async fn exchange_client_credentials(&self, scopes: &ScopeSet) -> Result<AccessToken> {
		const GRANT: TokenGrant = TokenGrant::ClientCredentials;

		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let mut form = BTreeMap::new();

		self.strategy.augment_token_request(GRANT, &mut form);

		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in scopes {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}
		for (key, value) in form {
			request = request.add_extra_param(key, value);
		}

		let response = request.request_async(&instrumented).await.map_err(|err| {
			map_request_error(self.strategy.as_ref(), GRANT, meta.take().as_ref(), err)
		})?;
		let expires_in = response
			.expires_in()
			.map(|value| {
				i64::try_from(value.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)
			})
			.transpose()?;

		issued_token(response.access_token().secret().to_owned(), expires_in)
	}
}
impl Debug for EntraIdClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EntraIdClient")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("tenant", &self.tenant)
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.finish()
	}
}
impl OnBehalfOfClient for EntraIdClient {
	fn acquire_token_on_behalf_of<'a>(
		&'a self,
		user_assertion: &'a str,
		scopes: &'a ScopeSet,
	) -> TokenFuture<'a> {
		Box::pin(self.exchange_on_behalf_of(user_assertion, scopes))
	}
}
impl ServiceTokenProvider for EntraIdClient {
	fn acquire_service_token<'a>(&'a self, scopes: &'a ScopeSet) -> TokenFuture<'a> {
		Box::pin(self.exchange_client_credentials(scopes))
	}
}

#[derive(Deserialize)]
struct OnBehalfOfResponse {
	access_token: String,
	#[serde(default, deserialize_with = "expires_in_seconds")]
	expires_in: Option<i64>,
}

// Entra ID has shipped `expires_in` both as a number and as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Text(String),
}

fn expires_in_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<ExpiresIn>::deserialize(deserializer)? {
		None => Ok(None),
		Some(ExpiresIn::Seconds(value)) => Ok(Some(value)),
		Some(ExpiresIn::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
			D::Error::custom(format_args!("expires_in `{text}` is not a whole number of seconds"))
		}),
	}
}

#[derive(Debug, Default, Deserialize)]
struct EntraErrorResponse {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	error_codes: Vec<u32>,
	#[serde(default)]
	correlation_id: Option<String>,
}

fn issued_token(secret: String, expires_in: Option<i64>) -> Result<AccessToken> {
	let expires_in = expires_in.ok_or(ConfigError::MissingExpiresIn)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let expires_at = OffsetDateTime::now_utc()
		.checked_add(Duration::seconds(expires_in))
		.ok_or(ConfigError::ExpiresInOutOfRange)?;

	Ok(AccessToken::new(secret, Some(expires_at)))
}

fn map_error_body(
	strategy: &dyn ProviderStrategy,
	grant: TokenGrant,
	meta: Option<&ResponseMetadata>,
	body: &[u8],
) -> Error {
	let mut ctx = ProviderErrorContext::new(grant);

	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	match serde_json::from_slice::<EntraErrorResponse>(body) {
		Ok(response) => {
			let codes = if response.error_codes.is_empty() {
				aadsts_codes(response.error_description.as_deref())
			} else {
				response.error_codes
			};

			ctx = ctx.with_oauth_error(response.error.clone()).with_error_codes(codes);

			if let Some(description) = &response.error_description {
				ctx = ctx.with_error_description(description.clone());
			}

			let message = oauth_error_message(
				&response.error,
				response.error_description.as_deref(),
				response.correlation_id.as_deref(),
			);

			classified_error(strategy.classify_token_error(&ctx), message, meta)
		},
		Err(_) => {
			ctx = ctx.with_body_preview(String::from_utf8_lossy(body));

			let message = match meta_status(meta) {
				Some(status) => format!("HTTP {status} without an OAuth error payload"),
				None => "response without an OAuth error payload".into(),
			};

			classified_error(strategy.classify_token_error(&ctx), message, meta)
		},
	}
}

fn map_request_error(
	strategy: &dyn ProviderStrategy,
	grant: TokenGrant,
	meta: Option<&ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, grant, response, meta),
		RequestTokenError::Request(error) => map_transport_error(meta, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::token_response_parse(error, meta_status(meta)).into(),
		RequestTokenError::Other(message) => transient(meta, message),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: TokenGrant,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let error = response.error().as_ref().to_owned();
	let description = response.error_description().cloned();
	let mut ctx = ProviderErrorContext::new(grant)
		.with_oauth_error(error.clone())
		.with_error_codes(aadsts_codes(description.as_deref()));

	if let Some(description) = &description {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = oauth_error_message(&error, description.as_deref(), None);

	classified_error(strategy.classify_token_error(&ctx), message, meta)
}

fn classified_error(
	kind: ProviderErrorKind,
	message: String,
	meta: Option<&ResponseMetadata>,
) -> Error {
	match kind {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason: message },
		ProviderErrorKind::InteractionRequired => Error::InteractionRequired { reason: message },
		ProviderErrorKind::Transient => transient(meta, message),
	}
}

fn map_transport_error(
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<ReqwestError>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::from(inner).into(),
		HttpClientError::Other(message) => transient(
			meta,
			format!("HTTP client error occurred while calling the token endpoint: {message}"),
		),
		_ => transient(meta, "HTTP client error occurred while calling the token endpoint".into()),
	}
}

fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta.and_then(|value| value.retry_after),
			request_id: meta.and_then(|value| value.request_id.clone()),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn transient(meta: Option<&ResponseMetadata>, message: String) -> Error {
	TransientError::TokenEndpoint {
		message,
		status: meta_status(meta),
		retry_after: meta.and_then(|value| value.retry_after),
		request_id: meta.and_then(|value| value.request_id.clone()),
	}
	.into()
}

fn oauth_error_message(
	error: &str,
	description: Option<&str>,
	correlation_id: Option<&str>,
) -> String {
	let mut message = match description {
		Some(description) => format!("{error}: {}", description.trim_end_matches('.')),
		None => error.to_owned(),
	};

	if let Some(correlation_id) = correlation_id {
		message.push_str(&format!(" (correlation id {correlation_id})"));
	}

	message
}

// Entra ID descriptions start with `AADSTS<code>:` even when `error_codes` is absent.
fn aadsts_codes(description: Option<&str>) -> Vec<u32> {
	let Some(description) = description else {
		return Vec::new();
	};

	description
		.match_indices("AADSTS")
		.filter_map(|(idx, marker)| {
			let digits: String = description[idx + marker.len()..]
				.chars()
				.take_while(char::is_ascii_digit)
				.collect();

			digits.parse().ok()
		})
		.collect()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn expires_in_accepts_numbers_and_strings() {
		let number: OnBehalfOfResponse =
			serde_json::from_str(r#"{"access_token":"a","expires_in":3599}"#)
				.expect("Numeric expires_in should parse.");
		let text: OnBehalfOfResponse =
			serde_json::from_str(r#"{"access_token":"a","expires_in":"3599"}"#)
				.expect("String expires_in should parse.");

		assert_eq!(number.expires_in, Some(3599));
		assert_eq!(text.expires_in, Some(3599));
	}

	#[test]
	fn unparsable_expires_in_is_a_response_error() {
		let deserializer =
			&mut serde_json::Deserializer::from_str(r#"{"access_token":"a","expires_in":"soon"}"#);
		let err = serde_path_to_error::deserialize::<_, OnBehalfOfResponse>(deserializer)
			.map_err(|err| TransientError::token_response_parse(err, Some(200)))
			.err()
			.expect("Non-numeric expires_in should be rejected.");

		assert!(matches!(
			err,
			TransientError::TokenResponseParse { ref path, status: Some(200), .. }
				if path == "expires_in"
		));
	}

	#[test]
	fn issued_tokens_validate_expiry() {
		assert!(matches!(
			issued_token("a".into(), None),
			Err(Error::Config(ConfigError::MissingExpiresIn))
		));
		assert!(matches!(
			issued_token("a".into(), Some(0)),
			Err(Error::Config(ConfigError::NonPositiveExpiresIn))
		));
		assert!(matches!(
			issued_token("a".into(), Some(i64::MAX)),
			Err(Error::Config(ConfigError::ExpiresInOutOfRange))
		));

		let token = issued_token("a".into(), Some(60)).expect("Positive expiry should be accepted.");

		assert!(!token.is_expired());
	}

	#[test]
	fn aadsts_codes_are_extracted_from_descriptions() {
		assert_eq!(
			aadsts_codes(Some("AADSTS65001: The user or administrator has not consented.")),
			vec![65001]
		);
		assert!(aadsts_codes(Some("no codes here")).is_empty());
		assert!(aadsts_codes(None).is_empty());
	}

	#[test]
	fn error_bodies_are_classified() {
		let meta = ResponseMetadata { status: Some(400), ..Default::default() };
		let body = br#"{
			"error": "invalid_grant",
			"error_description": "AADSTS50013: Assertion failed signature validation.",
			"error_codes": [50013],
			"correlation_id": "c-1"
		}"#;
		let err = map_error_body(&EntraIdStrategy, TokenGrant::OnBehalfOf, Some(&meta), body);

		assert!(matches!(
			&err,
			Error::InvalidGrant { reason } if reason.contains("correlation id c-1")
		));

		let meta = ResponseMetadata { status: Some(503), ..Default::default() };
		let err = map_error_body(&EntraIdStrategy, TokenGrant::OnBehalfOf, Some(&meta), b"<html/>");

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenEndpoint { status: Some(503), .. })
		));
	}

	#[test]
	fn debug_output_redacts_the_client_secret() {
		let client = EntraIdClient::new(
			&AzureCloud::Public,
			TenantId::new("contoso.onmicrosoft.com").expect("Tenant fixture should be valid."),
			ClientId::new("adx-client").expect("Client fixture should be valid."),
			"very-secret",
			ReqwestHttpClient::default(),
		)
		.expect("Client should build.");

		assert!(!format!("{client:?}").contains("very-secret"));
		assert_eq!(
			client.token_endpoint().as_str(),
			"https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
		);
	}

	#[test]
	fn blank_secrets_are_rejected() {
		let result = EntraIdClient::new(
			&AzureCloud::Public,
			TenantId::new("contoso").expect("Tenant fixture should be valid."),
			ClientId::new("adx-client").expect("Client fixture should be valid."),
			" ",
			ReqwestHttpClient::default(),
		);

		assert!(matches!(result, Err(Error::Config(ConfigError::MissingClientSecret))));
	}
}
