//! Provider strategy hooks that customize token exchanges.
//!
//! Implementations decorate outgoing token requests and normalize error mapping
//! without tying the Entra ID client to any particular HTTP stack.

// std
use std::collections::BTreeMap;
// self
use crate::_prelude::*;

/// Grants the broker sends to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenGrant {
	/// JWT-bearer assertion exchanged on behalf of a user.
	OnBehalfOf,
	/// Client credentials of the service principal.
	ClientCredentials,
}
impl TokenGrant {
	/// The `grant_type` form value.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenGrant::OnBehalfOf => "urn:ietf:params:oauth:grant-type:jwt-bearer",
			TokenGrant::ClientCredentials => "client_credentials",
		}
	}
}

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Implementors are required to be `Send + Sync`, and the hooks use crate-owned data
/// types so downstream crates never depend on reqwest-specific structures.
pub trait ProviderStrategy: Send + Sync {
	/// Maps token-endpoint failures into the broker taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add custom form parameters before dispatching.
	///
	/// The default implementation does nothing. Override the hook when a deployment needs extra
	/// fields (claims challenges, `resource` for v1 endpoints, etc.).
	fn augment_token_request(&self, _grant: TokenGrant, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (expired, revoked, or malformed assertion).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the application may obtain.
	InsufficientScope,
	/// Consent, MFA, or a conditional access policy needs the user.
	InteractionRequired,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
///
/// Only primitive data is kept (status codes, OAuth fields, Entra ID error codes, body preview)
/// so strategies stay decoupled from the HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant associated with the failing request.
	pub grant: TokenGrant,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Entra ID `error_codes` (the numeric part of `AADSTSxxxxx`).
	pub error_codes: Vec<u32>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant.
	pub fn new(grant: TokenGrant) -> Self {
		Self {
			grant,
			http_status: None,
			oauth_error: None,
			error_description: None,
			error_codes: Vec::new(),
			body_preview: None,
		}
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds Entra ID error codes.
	pub fn with_error_codes(mut self, codes: impl IntoIterator<Item = u32>) -> Self {
		self.error_codes.extend(codes);

		self
	}

	/// Adds a body preview for responses that are not OAuth error JSON.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy for Microsoft Entra ID.
///
/// Interaction-demanding Entra ID error codes win over the generic OAuth `error` field, because
/// Entra reports consent and MFA requirements as `invalid_grant`. Then come the OAuth fields,
/// body text hints, and finally the HTTP status code.
#[derive(Debug, Default)]
pub struct EntraIdStrategy;
impl EntraIdStrategy {
	// AADSTS65001 consent, 50076/50079 MFA, 50158 external challenge, 53003 conditional access.
	const INTERACTION_CODES: [u32; 5] = [65001, 50076, 50079, 50158, 53003];
}
impl Display for EntraIdStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("entra-id-strategy")
	}
}
impl ProviderStrategy for EntraIdStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.error_codes.iter().any(|code| Self::INTERACTION_CODES.contains(code)) {
			return ProviderErrorKind::InteractionRequired;
		}
		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error.and_then(match_exact_value).or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	const TABLE: [(&str, ProviderErrorKind); 9] = [
		("invalid_grant", ProviderErrorKind::InvalidGrant),
		("access_denied", ProviderErrorKind::InvalidGrant),
		("interaction_required", ProviderErrorKind::InteractionRequired),
		("consent_required", ProviderErrorKind::InteractionRequired),
		("invalid_client", ProviderErrorKind::InvalidClient),
		("unauthorized_client", ProviderErrorKind::InvalidClient),
		("invalid_scope", ProviderErrorKind::InsufficientScope),
		("temporarily_unavailable", ProviderErrorKind::Transient),
		("server_error", ProviderErrorKind::Transient),
	];

	TABLE.iter().find(|(name, _)| value.eq_ignore_ascii_case(name)).map(|(_, kind)| *kind)
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("interaction_required") || text.contains("consent_required") =>
			Some(ProviderErrorKind::InteractionRequired),
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("invalid_scope") => Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}
