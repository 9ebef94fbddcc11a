//! Cache keys partitioning exchanged tokens per presented identity token or per service scope.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Stable key identifying one cache slot.
///
/// Identity tokens already encode user, session, and expiry, so one slot per distinct ID token
/// partitions exchanged tokens per authenticated session. The token itself is never stored: the
/// key holds a base64 (no padding) SHA-256 digest of it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);
impl CacheKey {
	/// Wraps any stable string as a key.
	pub fn new(value: impl AsRef<str>) -> Self {
		Self(Arc::from(value.as_ref()))
	}

	/// Derives the slot for an on-behalf-of exchange of `id_token`.
	pub fn for_id_token(id_token: &TokenSecret) -> Self {
		let digest = Sha256::digest(id_token.expose().as_bytes());

		Self::new(format!("obo:{}", STANDARD_NO_PAD.encode(digest)))
	}

	/// Derives the slot for the service identity's token covering `scopes`.
	pub fn for_service(scopes: &ScopeSet) -> Self {
		Self::new(format!("svc:{}", scopes.joined()))
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		self.as_str()
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CacheKey({})", self.0)
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
