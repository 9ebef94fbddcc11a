//! On-behalf-of token broker for Azure Data Explorer data sources.
//!
//! End-user identity tokens are exchanged through Microsoft Entra ID and every exchange is shared
//! across the concurrent requests that need it. Provider internals stay out of caller-facing
//! errors.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
#[cfg(feature = "reqwest")] pub mod http;
#[cfg(feature = "reqwest")] pub mod oauth;
pub mod obs;
pub mod provider;
pub mod service;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{AccessToken, ScopeSet},
		provider::{OnBehalfOfClient, ServiceTokenProvider, TokenFuture},
	};
	#[cfg(feature = "reqwest")]
	use crate::{
		auth::{ClientId, TenantId},
		http::ReqwestHttpClient,
		oauth::EntraIdClient,
		provider::AzureCloud,
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs an [`EntraIdClient`] whose authority points at a mock server base URL.
	#[cfg(feature = "reqwest")]
	pub fn build_test_entra_client(authority: &str, tenant: &str) -> EntraIdClient {
		let authority = Url::parse(authority).expect("Mock authority URL should parse.");
		let cloud = AzureCloud::Custom { authority_host: authority };
		let tenant = TenantId::new(tenant).expect("Tenant fixture should be valid.");
		let client_id = ClientId::new("adx-client").expect("Client fixture should be valid.");

		EntraIdClient::new(&cloud, tenant, client_id, "adx-secret", test_reqwest_http_client())
			.expect("Entra ID client should build for tests.")
	}

	/// Scripted provider that counts calls and answers with a fixed outcome after an optional
	/// delay.
	#[derive(Debug)]
	pub struct ScriptedProvider {
		outcome: Result<AccessToken>,
		delay: std::time::Duration,
		calls: std::sync::atomic::AtomicUsize,
		assertions: Mutex<Vec<String>>,
	}
	impl ScriptedProvider {
		/// Answers every call with `token`, expiring after `ttl`.
		pub fn issuing(token: &str, ttl: Duration) -> Self {
			Self::with_outcome(Ok(AccessToken::new(token, Some(OffsetDateTime::now_utc() + ttl))))
		}

		/// Answers every call with `error`.
		pub fn failing(error: Error) -> Self {
			Self::with_outcome(Err(error))
		}

		fn with_outcome(outcome: Result<AccessToken>) -> Self {
			Self {
				outcome,
				delay: std::time::Duration::ZERO,
				calls: Default::default(),
				assertions: Default::default(),
			}
		}

		/// Sleeps for `delay` before answering.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = delay;

			self
		}

		/// Number of exchanges performed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(std::sync::atomic::Ordering::SeqCst)
		}

		/// User assertions received by on-behalf-of exchanges, in call order.
		pub fn assertions(&self) -> Vec<String> {
			self.assertions.lock().clone()
		}

		async fn answer(&self) -> Result<AccessToken> {
			self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			self.outcome.clone()
		}
	}
	impl OnBehalfOfClient for ScriptedProvider {
		fn acquire_token_on_behalf_of<'a>(
			&'a self,
			user_assertion: &'a str,
			_scopes: &'a ScopeSet,
		) -> TokenFuture<'a> {
			self.assertions.lock().push(user_assertion.to_owned());

			Box::pin(self.answer())
		}
	}
	impl ServiceTokenProvider for ScriptedProvider {
		fn acquire_service_token<'a>(&'a self, _scopes: &'a ScopeSet) -> TokenFuture<'a> {
			Box::pin(self.answer())
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {adx_token_broker as _, color_eyre as _, httpmock as _, tracing_subscriber as _};
