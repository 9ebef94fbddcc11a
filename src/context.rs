//! Request-scoped user identity, deadline, and cancellation.
//!
//! A [`RequestContext`] travels with every inbound request. It optionally carries the caller's
//! [`UserContext`] (display identity, ID token, bearer token) plus the deadline and cancellation
//! signal that bound token acquisition. Contexts are values: attaching a user or tightening the
//! deadline returns a new context and never mutates the original.

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::http::{
	HeaderMap, HeaderName, HeaderValue,
	header::{AUTHORIZATION, InvalidHeaderValue},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Header carrying the signed-in user's identity token.
pub const ID_TOKEN_HEADER: &str = "x-id-token";

/// Display identity of the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Login handle; the only identity detail that appears in caller-facing errors.
	pub login: String,
	/// Display name, if known.
	pub name: Option<String>,
	/// Email address, if known.
	pub email: Option<String>,
}
impl UserIdentity {
	/// Creates an identity with only a login.
	pub fn new(login: impl Into<String>) -> Self {
		Self { login: login.into(), name: None, email: None }
	}

	/// Sets the display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Sets the email address.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}
}

/// User details extracted from an inbound request.
#[derive(Clone, Debug, Default)]
pub struct UserContext {
	/// Signed-in user, or `None` for system requests.
	pub identity: Option<UserIdentity>,
	/// Identity token presented in [`ID_TOKEN_HEADER`].
	pub id_token: Option<TokenSecret>,
	/// Caller's own bearer token from the `Authorization` header.
	pub bearer_token: Option<TokenSecret>,
}
impl UserContext {
	/// Creates a context for `identity` without any tokens.
	pub fn for_user(identity: UserIdentity) -> Self {
		Self { identity: Some(identity), ..Default::default() }
	}

	/// Attaches an identity token; blank values are ignored.
	pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = TokenSecret::non_empty(token);

		self
	}

	/// Attaches a caller bearer token; blank values are ignored.
	pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
		self.bearer_token = TokenSecret::non_empty(token);

		self
	}

	/// Login of the signed-in user, if any.
	pub fn login(&self) -> Option<&str> {
		self.identity.as_ref().map(|identity| identity.login.as_str())
	}

	/// Returns `true` when no user is signed in.
	pub fn is_system(&self) -> bool {
		self.identity.is_none()
	}
}

/// The parts of an inbound data-source request the broker reads.
#[derive(Clone, Debug, Default)]
pub struct IncomingRequest {
	/// Signed-in user as reported by the host, or `None` for system requests.
	pub user: Option<UserIdentity>,
	/// Inbound HTTP headers.
	pub headers: HeaderMap,
}
impl IncomingRequest {
	/// Creates an empty system request.
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks the request as issued by `user`.
	pub fn with_user(mut self, user: UserIdentity) -> Self {
		self.user = Some(user);

		self
	}

	/// Adds a header, replacing any previous value for `name`.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Adds the identity token header.
	pub fn with_id_token(self, token: &str) -> Result<Self, InvalidHeaderValue> {
		let value = HeaderValue::from_str(token)?;

		Ok(self.with_header(HeaderName::from_static(ID_TOKEN_HEADER), value))
	}

	/// Adds an `Authorization` header with the given raw value.
	pub fn with_authorization(self, value: &str) -> Result<Self, InvalidHeaderValue> {
		let value = HeaderValue::from_str(value)?;

		Ok(self.with_header(AUTHORIZATION, value))
	}

	fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
		self.headers.get(name.as_ref())?.to_str().ok()
	}

	// Passed to the identity provider exactly as received.
	fn id_token(&self) -> Option<TokenSecret> {
		self.header_str(ID_TOKEN_HEADER).and_then(TokenSecret::non_empty)
	}

	fn bearer_token(&self) -> Option<TokenSecret> {
		let (scheme, token) = self.header_str(AUTHORIZATION)?.trim().split_once(' ')?;

		if !scheme.eq_ignore_ascii_case("bearer") {
			return None;
		}

		TokenSecret::non_empty(token.trim())
	}
}

/// Per-request state threaded through token acquisition.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	user: Option<Arc<UserContext>>,
	deadline: Option<Instant>,
	cancellation: Option<CancellationToken>,
}
impl RequestContext {
	/// Creates a context with no user, deadline, or cancellation signal.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a context carrying `user`, replacing any user already attached.
	pub fn with_user(mut self, user: UserContext) -> Self {
		self.user = Some(Arc::new(user));

		self
	}

	/// Returns a context carrying the user details found in `request`.
	///
	/// The identity token comes from [`ID_TOKEN_HEADER`] and the bearer token from an
	/// `Authorization: Bearer` header (scheme matched case-insensitively). Any other scheme, or
	/// a missing header, leaves the bearer token unset. System requests attach a context without
	/// an identity.
	pub fn with_user_from_request(self, request: &IncomingRequest) -> Self {
		self.with_user(UserContext {
			identity: request.user.clone(),
			id_token: request.id_token(),
			bearer_token: request.bearer_token(),
		})
	}

	/// The attached user context, if any.
	pub fn user(&self) -> Option<&UserContext> {
		self.user.as_deref()
	}

	/// Bounds the request to `timeout` from now, keeping any earlier deadline.
	pub fn with_timeout(self, timeout: StdDuration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Bounds the request to `deadline`, keeping any earlier deadline.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));

		self
	}

	/// The instant after which acquisition gives up, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Attaches a cancellation signal.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);

		self
	}

	/// Returns `true` once the attached cancellation signal fired.
	pub fn is_cancelled(&self) -> bool {
		self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
	}

	/// Drives `fut` until it completes, the deadline passes, or the request is cancelled.
	///
	/// Interrupting `fut` drops it; work it was awaiting is abandoned, not rolled back.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let deadline = async {
			match self.deadline {
				Some(deadline) => tokio::time::sleep_until(deadline).await,
				None => std::future::pending().await,
			}
		};
		let cancelled = async {
			match &self.cancellation {
				Some(token) => token.cancelled().await,
				None => std::future::pending().await,
			}
		};

		tokio::select! {
			biased;

			_ = cancelled => Err(Error::Cancelled),
			_ = deadline => Err(Error::TimedOut),
			outcome = fut => outcome,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn request(authorization: &str) -> IncomingRequest {
		IncomingRequest::new()
			.with_user(UserIdentity::new("alice"))
			.with_authorization(authorization)
			.expect("Authorization fixture should be a valid header value.")
	}

	#[test]
	fn bearer_scheme_is_case_insensitive() {
		for header in ["Bearer abc", "bearer abc", "BEARER   abc"] {
			let ctx = RequestContext::new().with_user_from_request(&request(header));
			let user = ctx.user().expect("User context should be attached.");

			assert_eq!(
				user.bearer_token.as_ref().map(TokenSecret::expose),
				Some("abc"),
				"Header {header:?} should yield a bearer token."
			);
		}
	}

	#[test]
	fn other_schemes_yield_no_bearer_token() {
		for header in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer    ", "abc"] {
			let ctx = RequestContext::new().with_user_from_request(&request(header));

			assert!(ctx.user().expect("User context should be attached.").bearer_token.is_none());
		}
	}

	#[test]
	fn id_token_header_is_read_case_insensitively() {
		let request = IncomingRequest::new()
			.with_user(UserIdentity::new("alice").with_email("alice@contoso.com"))
			.with_header(HeaderName::from_static("x-id-token"), HeaderValue::from_static("id-1"));
		let ctx = RequestContext::new().with_user_from_request(&request);
		let user = ctx.user().expect("User context should be attached.");

		assert_eq!(user.id_token.as_ref().map(TokenSecret::expose), Some("id-1"));
		assert_eq!(user.login(), Some("alice"));
	}

	#[test]
	fn id_tokens_are_kept_verbatim() {
		let request = IncomingRequest::new()
			.with_user(UserIdentity::new("alice"))
			.with_id_token("id-1 ")
			.expect("ID token fixture should be a valid header value.");
		let ctx = RequestContext::new().with_user_from_request(&request);
		let user = ctx.user().expect("User context should be attached.");

		assert_eq!(user.id_token.as_ref().map(TokenSecret::expose), Some("id-1 "));
	}

	#[test]
	fn system_requests_attach_an_anonymous_user() {
		let ctx = RequestContext::new().with_user_from_request(&IncomingRequest::new());
		let user = ctx.user().expect("User context should be attached.");

		assert!(user.is_system());
		assert!(user.id_token.is_none());
	}

	#[test]
	fn attaching_a_user_leaves_the_original_untouched() {
		let base = RequestContext::new();
		let derived = base.clone().with_user(UserContext::for_user(UserIdentity::new("bob")));

		assert!(base.user().is_none());
		assert_eq!(derived.user().and_then(UserContext::login), Some("bob"));
	}

	#[tokio::test(start_paused = true)]
	async fn shorter_deadline_wins() {
		let ctx = RequestContext::new()
			.with_timeout(StdDuration::from_secs(5))
			.with_timeout(StdDuration::from_secs(30));
		let deadline = ctx.deadline().expect("Deadline should be set.");

		assert!(deadline <= Instant::now() + StdDuration::from_secs(5));
	}

	#[tokio::test(start_paused = true)]
	async fn run_times_out() {
		let ctx = RequestContext::new().with_timeout(StdDuration::from_millis(50));
		let outcome = ctx
			.run(async {
				tokio::time::sleep(StdDuration::from_secs(1)).await;

				Ok::<_, Error>(())
			})
			.await;

		assert!(matches!(outcome, Err(Error::TimedOut)));
	}

	#[tokio::test]
	async fn run_observes_cancellation() {
		let token = CancellationToken::new();
		let ctx = RequestContext::new().with_cancellation(token.clone());

		token.cancel();

		assert!(ctx.is_cancelled());
		assert!(matches!(ctx.run(async { Ok::<_, Error>(1) }).await, Err(Error::Cancelled)));
	}

	#[tokio::test]
	async fn run_passes_outcomes_through() {
		let ctx = RequestContext::new().with_timeout(StdDuration::from_secs(5));

		assert_eq!(ctx.run(async { Ok::<_, Error>(7) }).await.expect("Future should complete."), 7);
	}
}
