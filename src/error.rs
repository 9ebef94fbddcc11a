//! Broker-level error types shared across the cache, providers, and the credential service.
//!
//! Every type here is cheap to clone: a single failed exchange is handed to the caller that ran
//! it and to every caller that queued behind it, so sources that are not `Clone` themselves are
//! held behind an [`Arc`].

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The request context cannot satisfy the configured acquisition mode.
	#[error(transparent)]
	Context(#[from] ContextError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Requested scopes exceed what the application may obtain.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., expired or malformed user assertion).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// The user must consent or satisfy a conditional access policy interactively.
	#[error("User interaction is required: {reason}.")]
	InteractionRequired {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},

	/// On-behalf-of exchange failed; the upstream detail is only logged server-side.
	#[error("Unable to acquire access token for user '{login}'.")]
	UserTokenUnavailable {
		/// Login of the user whose token could not be exchanged.
		login: String,
	},
	/// The request deadline elapsed before a token became available.
	#[error("Token acquisition timed out.")]
	TimedOut,
	/// The request was cancelled before a token became available.
	#[error("Token acquisition was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns `true` for deadline and cancellation failures, which are not provider verdicts.
	pub fn is_interrupted(&self) -> bool {
		matches!(self, Self::TimedOut | Self::Cancelled)
	}
}

/// Configuration and validation failures raised while building broker components.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// An authority or cluster URL cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Which setting failed validation.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Authority endpoints must use HTTPS.
	#[error("The authority endpoint must use HTTPS: {url}.")]
	InsecureAuthority {
		/// Authority URL that failed validation.
		url: String,
	},
	/// Cluster URL is not an absolute URL with a host.
	#[error("Cluster URL must be an absolute URL with a host: {url}.")]
	InvalidClusterUrl {
		/// Cluster URL that failed validation.
		url: String,
	},
	/// Custom clouds need an explicit authority host.
	#[error("The customized cloud requires an authority host.")]
	MissingAuthorityHost,
	/// Tenant or client identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// The client secret is missing or empty.
	#[error("Client secret is required.")]
	MissingClientSecret,
	/// Data-source settings JSON cannot be deserialized.
	#[error("Data-source settings are invalid at `{path}`.")]
	InvalidSettings {
		/// JSON path of the offending field.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_json::Error>,
	},
	/// Query timeout cannot be parsed.
	#[error("Query timeout `{value}` is not a valid duration.")]
	InvalidTimeout {
		/// Raw setting value.
		value: String,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Request-scoped failures: the inbound request lacks what the acquisition mode needs.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ContextError {
	/// No user context was attached to the request.
	#[error("User context not configured.")]
	MissingUserContext,
	/// A user context is attached but carries no signed-in user (system or service call).
	#[error("Non-user requests cannot use on-behalf-of authentication.")]
	NonUserRequest,
	/// The signed-in user did not present an ID token.
	#[error("User context doesn't have ID token.")]
	MissingIdToken,
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
		/// Entra ID request identifier, if supplied.
		request_id: Option<String>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON at `{path}`.")]
	TokenResponseParse {
		/// JSON path of the offending field.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	pub(crate) fn token_response_parse(
		err: serde_path_to_error::Error<serde_json::Error>,
		status: Option<u16>,
	) -> Self {
		let path = err.path().to_string();

		Self::TokenResponseParse { path, source: Arc::new(err.into_inner()), status }
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn context_errors_render_caller_facing_messages() {
		let err = Error::from(ContextError::MissingIdToken);

		assert_eq!(err.to_string(), "User context doesn't have ID token.");
		assert_eq!(
			Error::from(ContextError::MissingUserContext).to_string(),
			"User context not configured."
		);
	}

	#[test]
	fn user_token_errors_only_name_the_login() {
		let err = Error::UserTokenUnavailable { login: "alice".into() };

		assert_eq!(err.to_string(), "Unable to acquire access token for user 'alice'.");
		assert!(StdError::source(&err).is_none());
	}

	#[test]
	fn cloned_errors_keep_their_source() {
		let err: Error = TransportError::from(std::io::Error::other("socket closed")).into();
		let cloned = err.clone();
		let source = StdError::source(&cloned)
			.expect("Cloned transport error should expose the I/O source.");

		assert_eq!(source.to_string(), "socket closed");
	}

	#[test]
	fn interruption_is_distinct_from_rejection() {
		assert!(Error::TimedOut.is_interrupted());
		assert!(Error::Cancelled.is_interrupted());
		assert!(!Error::InvalidGrant { reason: "expired".into() }.is_interrupted());
	}
}
