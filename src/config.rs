//! Data-source settings as stored by the dashboard host.
//!
//! [`CredentialSettings`] mirrors the camelCase JSON of the data-source configuration. Fields
//! stay loosely typed here; each accessor validates one of them and reports a [`ConfigError`],
//! so a service is never built from settings that only half make sense.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TenantId, TokenSecret},
	error::ConfigError,
	provider::AzureCloud,
	service::AcquisitionMode,
};

/// Cloud names accepted in the `azureCloud` setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudName {
	/// Azure public cloud.
	#[default]
	#[serde(rename = "AzureCloud")]
	Public,
	/// Azure operated by 21Vianet.
	#[serde(rename = "AzureChinaCloud")]
	China,
	/// Azure US Government.
	#[serde(rename = "AzureUSGovernment")]
	UsGovernment,
	/// Cloud described by `authorityHost`.
	#[serde(rename = "AzureCustomizedCloud")]
	Customized,
}

/// Credential-related data-source settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSettings {
	/// Cloud hosting the cluster and the identity provider.
	#[serde(default)]
	pub azure_cloud: CloudName,
	/// Authority base URL; required for [`CloudName::Customized`].
	#[serde(default)]
	pub authority_host: Option<String>,
	/// Cluster URL, such as `https://help.kusto.windows.net`.
	pub cluster_url: String,
	/// Directory (tenant) identifier.
	pub tenant_id: String,
	/// Application (client) identifier.
	pub client_id: String,
	/// Application secret.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Token acquisition mode.
	#[serde(default)]
	pub azure_auth_type: AcquisitionMode,
	/// Upper bound for every acquisition, as a duration string (`30s`, `1m30s`).
	#[serde(default)]
	pub query_timeout: Option<String>,
}
impl CredentialSettings {
	/// Parses settings from the host's JSON document.
	pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_slice(json);

		serde_path_to_error::deserialize(deserializer).map_err(|err| {
			let path = err.path().to_string();

			ConfigError::InvalidSettings { path, source: Arc::new(err.into_inner()) }
		})
	}

	/// Resolves the configured cloud.
	pub fn cloud(&self) -> Result<AzureCloud, ConfigError> {
		let cloud = match self.azure_cloud {
			CloudName::Public => AzureCloud::Public,
			CloudName::China => AzureCloud::China,
			CloudName::UsGovernment => AzureCloud::UsGovernment,
			CloudName::Customized => {
				let raw = self
					.authority_host
					.as_deref()
					.map(str::trim)
					.filter(|raw| !raw.is_empty())
					.ok_or(ConfigError::MissingAuthorityHost)?;
				let authority_host = Url::parse(raw)
					.map_err(|source| ConfigError::InvalidUrl { field: "authority host", source })?;

				AzureCloud::Custom { authority_host }
			},
		};

		// Fail on insecure authorities here rather than at the first exchange.
		cloud.authority_host()?;

		Ok(cloud)
	}

	/// Validated tenant identifier.
	pub fn tenant(&self) -> Result<TenantId, ConfigError> {
		Ok(TenantId::new(self.tenant_id.trim())?)
	}

	/// Validated client identifier.
	pub fn client(&self) -> Result<ClientId, ConfigError> {
		Ok(ClientId::new(self.client_id.trim())?)
	}

	/// The configured secret, if it is not blank.
	pub fn secret(&self) -> Result<&TokenSecret, ConfigError> {
		self.client_secret
			.as_ref()
			.filter(|secret| !secret.expose().trim().is_empty())
			.ok_or(ConfigError::MissingClientSecret)
	}

	/// Scopes requested for the configured cluster.
	pub fn scopes(&self) -> Result<ScopeSet, ConfigError> {
		self.cloud()?.adx_scopes(self.cluster_url.trim())
	}

	/// The acquisition bound; blank and zero values disable it.
	pub fn query_timeout(&self) -> Result<Option<StdDuration>, ConfigError> {
		match self.query_timeout.as_deref().map(str::trim) {
			None | Some("") => Ok(None),
			Some(raw) => parse_duration(raw).map(|timeout| (!timeout.is_zero()).then_some(timeout)),
		}
	}
}

/// Parses a duration string made of decimal numbers with unit suffixes, such as `300ms`, `1.5h`,
/// or `2h45m`. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m`, and `h`. A bare `0` is
/// accepted; signs are not.
pub fn parse_duration(value: &str) -> Result<StdDuration, ConfigError> {
	let invalid = || ConfigError::InvalidTimeout { value: value.to_owned() };
	let text = value.trim();

	if text == "0" {
		return Ok(StdDuration::ZERO);
	}
	if text.is_empty() {
		return Err(invalid());
	}

	let mut rest = text;
	let mut nanos = 0_f64;

	while !rest.is_empty() {
		let number_len =
			rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());

		if number_len == 0 {
			return Err(invalid());
		}

		let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;

		rest = &rest[number_len..];

		let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
		let scale = match &rest[..unit_len] {
			"ns" => 1.0,
			"us" | "µs" | "μs" => 1e3,
			"ms" => 1e6,
			"s" => 1e9,
			"m" => 60e9,
			"h" => 3_600e9,
			_ => return Err(invalid()),
		};

		nanos += number * scale;
		rest = &rest[unit_len..];
	}

	if !nanos.is_finite() || nanos >= u64::MAX as f64 {
		return Err(invalid());
	}

	Ok(StdDuration::from_nanos(nanos.round() as u64))
}
