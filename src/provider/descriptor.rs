//! Provider descriptor data structures and helpers shared by all storefront clients.
//!
//! A descriptor carries everything about a storefront that is data rather than behavior:
//! endpoint base URLs, the client-authentication method its token endpoint expects, and
//! the quirks that differ between storefronts. Built-in descriptors point at the public
//! production hosts; tests and staging deployments build their own.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{
	_prelude::*,
	auth::ProviderKind,
	error::ConfigError,
	provider::ProviderOperation,
};

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// No token endpoint client authentication (OpenID-style logins).
	None,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Login page the user is redirected to.
	pub authorization: Url,
	/// OAuth token endpoint, when the provider issues OAuth tokens.
	pub token: Option<Url>,
	/// Base URL for account/profile calls.
	pub account: Url,
	/// Base URL for owned-games calls when it differs from `account`.
	pub library: Option<Url>,
	/// Base URL for catalog search, when the provider has a public search API.
	pub search: Option<Url>,
	/// Base URL for price lookups, when the provider has a public price API.
	pub pricing: Option<Url>,
}
impl ProviderEndpoints {
	/// Base URL for owned-games calls.
	pub fn library(&self) -> &Url {
		self.library.as_ref().unwrap_or(&self.account)
	}
}

/// Immutable provider descriptor consumed by storefront clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Storefront this descriptor configures.
	pub kind: ProviderKind,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided storefront.
	pub fn builder(kind: ProviderKind) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(kind)
	}

	/// Checks whether the descriptor enables an operation.
	pub fn supports(&self, operation: ProviderOperation) -> bool {
		match operation {
			ProviderOperation::RefreshToken =>
				self.endpoints.token.is_some() && self.quirks.refresh_supported,
			ProviderOperation::Search => self.endpoints.search.is_some(),
			ProviderOperation::Price => self.endpoints.pricing.is_some(),
			ProviderOperation::ExchangeCode
			| ProviderOperation::AccountProfile
			| ProviderOperation::OwnedGames => true,
		}
	}

	/// Production descriptor for Steam (OpenID login + Web API + storefront API).
	pub fn steam() -> Result<Self, ConfigError> {
		Ok(Self::builder(ProviderKind::Steam)
			.authorization_endpoint(parse("https://steamcommunity.com/openid/login")?)
			.account_endpoint(parse("https://api.steampowered.com")?)
			.search_endpoint(parse("https://store.steampowered.com")?)
			.pricing_endpoint(parse("https://store.steampowered.com")?)
			.preferred_client_auth_method(ClientAuthMethod::None)
			.quirks(ProviderQuirks { refresh_supported: false, ..Default::default() })
			.build()?)
	}

	/// Production descriptor for GOG.
	pub fn gog() -> Result<Self, ConfigError> {
		Ok(Self::builder(ProviderKind::Gog)
			.authorization_endpoint(parse("https://auth.gog.com/auth")?)
			.token_endpoint(parse("https://auth.gog.com/token")?)
			.account_endpoint(parse("https://embed.gog.com")?)
			.search_endpoint(parse("https://embed.gog.com")?)
			.pricing_endpoint(parse("https://api.gog.com")?)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()?)
	}

	/// Production descriptor for the Epic Games Store.
	pub fn epic() -> Result<Self, ConfigError> {
		Ok(Self::builder(ProviderKind::Epic)
			.authorization_endpoint(parse("https://www.epicgames.com/id/authorize")?)
			.token_endpoint(parse("https://api.epicgames.dev/epic/oauth/v2/token")?)
			.account_endpoint(parse("https://api.epicgames.dev")?)
			.library_endpoint(parse("https://library-service.live.use1a.on.epicgames.com")?)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretBasic)
			.quirks(ProviderQuirks {
				scopes: vec!["basic_profile".into()],
				default_token_lifetime: Duration::hours(2),
				..Default::default()
			})
			.build()?)
	}
}

fn parse(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { source })
}
