//! Azure cloud authorities and the scopes requested for a cluster.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TenantId},
	error::ConfigError,
};

/// Azure cloud hosting the identity provider and the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AzureCloud {
	/// Azure public cloud.
	#[default]
	Public,
	/// Azure operated by 21Vianet.
	China,
	/// Azure US Government.
	UsGovernment,
	/// Sovereign or private cloud with an explicit authority host.
	Custom {
		/// Base URL of the Entra ID authority; must use HTTPS.
		authority_host: Url,
	},
}
impl AzureCloud {
	/// Authority host for this cloud.
	pub fn authority_host(&self) -> Result<Url, ConfigError> {
		let host = match self {
			Self::Public => Url::parse("https://login.microsoftonline.com/"),
			Self::China => Url::parse("https://login.chinacloudapi.cn/"),
			Self::UsGovernment => Url::parse("https://login.microsoftonline.us/"),
			Self::Custom { authority_host } => Ok(authority_host.clone()),
		}
		.map_err(|source| ConfigError::InvalidUrl { field: "authority", source })?;

		if host.scheme() != "https" {
			return Err(ConfigError::InsecureAuthority { url: host.to_string() });
		}

		Ok(host)
	}

	/// The v2.0 token endpoint for `tenant`.
	pub fn token_endpoint(&self, tenant: &TenantId) -> Result<Url, ConfigError> {
		let host = self.authority_host()?;
		let base = host.as_str().trim_end_matches('/');

		Url::parse(&format!("{base}/{tenant}/oauth2/v2.0/token"))
			.map_err(|source| ConfigError::InvalidUrl { field: "token endpoint", source })
	}

	/// Scopes to request for `cluster_url`.
	///
	/// Clusters inside this cloud's Kusto domain share the `https://kusto.kusto.<suffix>`
	/// resource; any other cluster is addressed by its own origin.
	pub fn adx_scopes(&self, cluster_url: &str) -> Result<ScopeSet, ConfigError> {
		let invalid = || ConfigError::InvalidClusterUrl { url: cluster_url.to_owned() };
		let cluster = Url::parse(cluster_url).map_err(|_| invalid())?;
		let host = cluster.host_str().filter(|host| !host.is_empty()).ok_or_else(invalid)?;
		let resource = match self.kusto_suffix() {
			Some(suffix) if host.eq_ignore_ascii_case(suffix) || ends_with_domain(host, suffix) =>
				format!("https://kusto.{suffix}"),
			_ => cluster.origin().ascii_serialization(),
		};

		Ok(ScopeSet::new([format!("{resource}/.default")])?)
	}

	fn kusto_suffix(&self) -> Option<&'static str> {
		match self {
			Self::Public => Some("kusto.windows.net"),
			Self::China => Some("kusto.chinacloudapi.cn"),
			Self::UsGovernment => Some("kusto.usgovcloudapi.net"),
			Self::Custom { .. } => None,
		}
	}
}

fn ends_with_domain(host: &str, suffix: &str) -> bool {
	let host = host.to_ascii_lowercase();

	host.strip_suffix(suffix).is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn tenant() -> TenantId {
		TenantId::new("contoso.onmicrosoft.com").expect("Tenant fixture should be valid.")
	}

	#[test]
	fn token_endpoints_follow_the_v2_layout() {
		let endpoint =
			AzureCloud::Public.token_endpoint(&tenant()).expect("Public endpoint should build.");

		assert_eq!(
			endpoint.as_str(),
			"https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
		);

		let china =
			AzureCloud::China.token_endpoint(&tenant()).expect("China endpoint should build.");

		assert_eq!(china.host_str(), Some("login.chinacloudapi.cn"));
	}

	#[test]
	fn custom_authorities_must_use_https() {
		let cloud = AzureCloud::Custom {
			authority_host: Url::parse("http://login.contoso.local").expect("URL should parse."),
		};

		assert!(matches!(
			cloud.token_endpoint(&tenant()),
			Err(ConfigError::InsecureAuthority { .. })
		));

		let cloud = AzureCloud::Custom {
			authority_host: Url::parse("https://login.contoso.local/prefix/")
				.expect("URL should parse."),
		};

		assert_eq!(
			cloud.token_endpoint(&tenant()).expect("Custom endpoint should build.").path(),
			"/prefix/contoso.onmicrosoft.com/oauth2/v2.0/token"
		);
	}

	#[test]
	fn clusters_in_the_cloud_domain_share_the_kusto_scope() {
		let scopes = AzureCloud::Public
			.adx_scopes("https://help.westeurope.kusto.windows.net")
			.expect("Public cluster scopes should build.");

		assert_eq!(scopes.joined(), "https://kusto.kusto.windows.net/.default");

		let scopes = AzureCloud::UsGovernment
			.adx_scopes("https://mycluster.kusto.usgovcloudapi.net")
			.expect("Government cluster scopes should build.");

		assert_eq!(scopes.joined(), "https://kusto.kusto.usgovcloudapi.net/.default");
	}

	#[test]
	fn other_clusters_use_their_origin() {
		let scopes = AzureCloud::Public
			.adx_scopes("https://adx.contoso.com:8443/v1/rest/query")
			.expect("Private cluster scopes should build.");

		assert_eq!(scopes.joined(), "https://adx.contoso.com:8443/.default");
		assert!(matches!(
			AzureCloud::Public.adx_scopes("not a url"),
			Err(ConfigError::InvalidClusterUrl { .. })
		));
		// Look-alike hosts are not inside the Kusto domain.
		assert_eq!(
			AzureCloud::Public
				.adx_scopes("https://evilkusto.windows.net")
				.expect("Look-alike cluster scopes should build.")
				.joined(),
			"https://evilkusto.windows.net/.default"
		);
	}
}
