//! Identity-provider seams (traits), Azure cloud data, and error-classification strategies.
//!
//! [`OnBehalfOfClient`] and [`ServiceTokenProvider`] are the only things the credential service
//! needs from an identity provider, so tests and alternative providers plug in without an HTTP
//! stack. `cloud` maps Azure clouds to authority hosts and cluster scopes. `strategy` maps
//! token-endpoint failures into the broker error taxonomy.

pub mod cloud;
pub mod strategy;

pub use cloud::*;
pub use strategy::*;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
};

/// Boxed future returned by provider trait methods.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Exchanges a user assertion for a downstream access token.
pub trait OnBehalfOfClient
where
	Self: Send + Sync,
{
	/// Runs the on-behalf-of exchange for `user_assertion` (the caller's ID token).
	fn acquire_token_on_behalf_of<'a>(
		&'a self,
		user_assertion: &'a str,
		scopes: &'a ScopeSet,
	) -> TokenFuture<'a>;
}

/// Issues tokens to the data source's own service principal.
pub trait ServiceTokenProvider
where
	Self: Send + Sync,
{
	/// Acquires a token for `scopes` using the service identity.
	fn acquire_service_token<'a>(&'a self, scopes: &'a ScopeSet) -> TokenFuture<'a>;
}
