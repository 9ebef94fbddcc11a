//! Access tokens returned by identity providers and the expiry rules the cache applies to them.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Access token paired with the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	/// Token value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// UTC expiry instant. `None` never expires and is reserved for synthetic tokens.
	pub expires_at: Option<OffsetDateTime>,
}
impl AccessToken {
	/// Creates a token with an optional absolute expiry.
	pub fn new(secret: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
		Self { secret: TokenSecret::new(secret), expires_at }
	}

	/// Creates a token that expires `expires_in` after `issued_at`.
	pub fn expiring_in(
		secret: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Self {
		Self::new(secret, Some(issued_at + expires_in))
	}

	/// Returns `true` when the expiry is set and strictly before `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at < instant)
	}

	/// Convenience helper that checks expiry against the current UTC instant.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn expiry_is_strict() {
		let expires = macros::datetime!(2025-01-01 01:00 UTC);
		let token = AccessToken::new("access", Some(expires));

		assert!(!token.is_expired_at(macros::datetime!(2025-01-01 00:59 UTC)));
		assert!(!token.is_expired_at(expires), "A token is still valid at its expiry instant.");
		assert!(token.is_expired_at(macros::datetime!(2025-01-01 01:00:01 UTC)));
	}

	#[test]
	fn tokens_without_expiry_never_expire() {
		let token = AccessToken::new("synthetic", None);

		assert!(!token.is_expired_at(macros::datetime!(9999-12-31 23:59 UTC)));
	}

	#[test]
	fn relative_expiry_is_anchored_to_issue_time() {
		let token = AccessToken::expiring_in(
			"access",
			macros::datetime!(2025-01-01 00:00 UTC),
			Duration::minutes(30),
		);

		assert_eq!(token.expires_at, Some(macros::datetime!(2025-01-01 00:30 UTC)));
		assert!(!format!("{token:?}").contains("\"access\""));
	}
}
