//! Demonstrates building a credential service from data-source settings and exchanging a
//! signed-in user's ID token for a cluster token, with concurrent requests sharing one exchange.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use adx_token_broker::{
	cache::SingleFlightCache,
	config::CredentialSettings,
	context::{IncomingRequest, RequestContext, UserIdentity},
	http::ReqwestHttpClient,
	reqwest::Client,
	service::CredentialService,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/contoso/oauth2/v2.0/token")
				.body_includes("requested_token_use=on_behalf_of");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-obo\",\"token_type\":\"Bearer\",\"expires_in\":3599}",
			);
		})
		.await;
	let settings = CredentialSettings::from_json(
		serde_json::json!({
			"azureCloud": "AzureCustomizedCloud",
			"authorityHost": server.url("/"),
			"clusterUrl": "https://help.kusto.windows.net",
			"tenantId": "contoso",
			"clientId": "demo-client",
			"clientSecret": "super-secret",
			"azureAuthType": "clientsecret-obo",
			"queryTimeout": "30s"
		})
		.to_string()
		.as_bytes(),
	)?;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let service = CredentialService::from_settings_with_http_client(
		&settings,
		Arc::new(SingleFlightCache::new()),
		http_client,
	)?;
	let request = IncomingRequest::new()
		.with_user(UserIdentity::new("alice").with_email("alice@contoso.com"))
		.with_id_token("alice-id-token")?;
	let ctx = RequestContext::new().with_user_from_request(&request);
	let (first, second) =
		tokio::join!(service.acquire_request_token(&ctx), service.acquire_request_token(&ctx));

	println!("Authorization header: {}.", first?.expose());
	println!("Concurrent request reused it: {}.", second?.expose());

	token_mock.assert_calls_async(1).await;
	service.dispose();

	Ok(())
}
