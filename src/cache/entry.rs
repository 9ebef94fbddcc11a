// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
};

/// Resolved value held by a cache slot.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheEntry {
	/// Exchanged access token.
	pub value: TokenSecret,
	/// UTC expiry; `None` never expires.
	pub expires_at: Option<OffsetDateTime>,
}
impl CacheEntry {
	/// Returns `true` when the expiry is set and strictly before `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at < instant)
	}
}
impl From<AccessToken> for CacheEntry {
	fn from(token: AccessToken) -> Self {
		Self { value: token.secret, expires_at: token.expires_at }
	}
}
impl Debug for CacheEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheEntry")
			.field("value", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
