//! Engine configuration: freshness, deadlines, rate budgets, and provider credentials.
//!
//! Values come from a JSON document ([`EngineConfig::from_json`]) or from process
//! variables ([`EngineConfig::from_env`]). Either path ends in [`EngineConfig::validate`],
//! so a bad value is rejected at startup rather than on the first outbound call. The vault
//! key is deliberately not part of this struct; see [`crate::vault::CredentialVault`].

// self
use crate::{
	_prelude::*,
	auth::{ProviderKind, RegionCode},
	error::ConfigError,
	ext::RateLimitSettings,
	provider::ProviderDescriptor,
};

const DEFAULT_PRICE_TTL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// OAuth client registered with a storefront.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
	/// Client identifier.
	pub client_id: String,
	/// Client secret.
	pub client_secret: String,
	/// Redirect URI registered with the storefront.
	pub redirect_uri: Url,
}
impl Debug for OAuthClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClientConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish()
	}
}

/// Steam Web API key plus the OpenID return address.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamConfig {
	/// Web API key.
	pub api_key: String,
	/// OpenID `return_to` address.
	pub redirect_uri: Url,
}
impl Debug for SteamConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SteamConfig")
			.field("api_key", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish()
	}
}

/// Replacement base URLs for one provider (staging hosts, local mocks).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
	/// Login page.
	pub authorization: Option<Url>,
	/// Token endpoint.
	pub token: Option<Url>,
	/// Account API base.
	pub account: Option<Url>,
	/// Owned-games API base.
	pub library: Option<Url>,
	/// Search API base.
	pub search: Option<Url>,
	/// Price API base.
	pub pricing: Option<Url>,
}
impl EndpointOverrides {
	/// Overrides every base URL with `base` (handy for a single mock server).
	pub fn all(base: Url) -> Self {
		Self {
			authorization: Some(base.clone()),
			token: Some(base.clone()),
			account: Some(base.clone()),
			library: Some(base.clone()),
			search: Some(base.clone()),
			pricing: Some(base),
		}
	}

	/// Applies the overrides and revalidates the descriptor.
	///
	/// Only endpoints the descriptor already declares are replaced, so an override never
	/// turns on a capability the storefront lacks.
	pub fn apply(
		&self,
		mut descriptor: ProviderDescriptor,
	) -> Result<ProviderDescriptor, ConfigError> {
		let endpoints = &mut descriptor.endpoints;

		if let Some(url) = &self.authorization {
			endpoints.authorization = url.clone();
		}
		if let Some(url) = &self.account {
			endpoints.account = url.clone();
		}

		for (slot, replacement) in [
			(&mut endpoints.token, &self.token),
			(&mut endpoints.library, &self.library),
			(&mut endpoints.search, &self.search),
			(&mut endpoints.pricing, &self.pricing),
		] {
			if let (Some(current), Some(url)) = (slot.as_mut(), replacement) {
				*current = url.clone();
			}
		}

		descriptor.validate()?;

		Ok(descriptor)
	}
}

/// Per-provider credentials and endpoint overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
	/// Steam credentials; Steam is not registered without them.
	pub steam: Option<SteamConfig>,
	/// Epic OAuth client; Epic is not registered without it.
	pub epic: Option<OAuthClientConfig>,
	/// GOG OAuth client; GOG is not registered without it.
	pub gog: Option<OAuthClientConfig>,
	/// Base-URL overrides keyed by provider.
	pub endpoints: BTreeMap<ProviderKind, EndpointOverrides>,
}

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Price freshness window in seconds.
	pub price_ttl_secs: u64,
	/// Region used when a caller does not name one.
	pub default_region: RegionCode,
	/// Deadline applied to every outbound call, in seconds.
	pub request_timeout_secs: u64,
	/// Rate-limit overrides; providers not listed use [`RateLimitSettings::default_for`].
	pub rate_limits: BTreeMap<ProviderKind, RateLimitSettings>,
	/// Provider credentials.
	pub providers: ProvidersConfig,
}
impl EngineConfig {
	/// Reads configuration from process variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads configuration through an arbitrary variable lookup.
	///
	/// Recognized variables: `PRICE_TTL_HOURS`, `PRICE_REGION`, `PROVIDER_TIMEOUT_SECS`,
	/// `STEAM_API_KEY`, `STEAM_REDIRECT_URI`, and `{EPIC,GOG}_{CLIENT_ID,CLIENT_SECRET,
	/// REDIRECT_URI}`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| {
			lookup(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let mut config = Self::default();

		if let Some(hours) = var("PRICE_TTL_HOURS") {
			let hours = parse_number::<u64>("PRICE_TTL_HOURS", &hours)?;

			config.price_ttl_secs = hours.saturating_mul(60 * 60);
		}
		if let Some(region) = var("PRICE_REGION") {
			config.default_region = RegionCode::new(region.to_ascii_lowercase())
				.map_err(|e| ConfigError::invalid_setting("PRICE_REGION", e))?;
		}
		if let Some(secs) = var("PROVIDER_TIMEOUT_SECS") {
			config.request_timeout_secs = parse_number("PROVIDER_TIMEOUT_SECS", &secs)?;
		}
		if let Some(api_key) = var("STEAM_API_KEY") {
			let redirect_uri = redirect(ProviderKind::Steam, var("STEAM_REDIRECT_URI"))?;

			config.providers.steam = Some(SteamConfig { api_key, redirect_uri });
		}

		config.providers.epic = oauth_client(ProviderKind::Epic, "EPIC", &var)?;
		config.providers.gog = oauth_client(ProviderKind::Gog, "GOG", &var)?;

		config.validate()?;

		Ok(config)
	}

	/// Parses a JSON document, reporting the path of the offending field on failure.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Sets the price freshness window.
	pub fn with_price_ttl(mut self, ttl: Duration) -> Self {
		self.price_ttl_secs = ttl.whole_seconds().max(0) as u64;

		self
	}

	/// Sets the per-call deadline.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout_secs = timeout.whole_seconds().max(0) as u64;

		self
	}

	/// Overrides the rate budget for one provider.
	pub fn with_rate_limit(mut self, kind: ProviderKind, settings: RateLimitSettings) -> Self {
		self.rate_limits.insert(kind, settings);

		self
	}

	/// Rejects values that would make the engine unusable.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.price_ttl_secs == 0 {
			return Err(ConfigError::invalid_setting("price_ttl_secs", "must be positive"));
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::invalid_setting("request_timeout_secs", "must be positive"));
		}

		for (kind, settings) in &self.rate_limits {
			settings.validate(*kind)?;
		}

		Ok(())
	}

	/// Price freshness window.
	pub fn price_ttl(&self) -> Duration {
		Duration::seconds(self.price_ttl_secs as i64)
	}

	/// Per-call deadline.
	pub fn request_timeout(&self) -> Duration {
		Duration::seconds(self.request_timeout_secs as i64)
	}

	/// Effective rate budget for a provider.
	pub fn rate_limit(&self, kind: ProviderKind) -> RateLimitSettings {
		self.rate_limits.get(&kind).copied().unwrap_or(RateLimitSettings::default_for(kind))
	}

	/// Endpoint overrides for a provider, if any.
	pub fn endpoint_overrides(&self, kind: ProviderKind) -> Option<&EndpointOverrides> {
		self.providers.endpoints.get(&kind)
	}
}
impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			price_ttl_secs: DEFAULT_PRICE_TTL_SECS,
			default_region: RegionCode::default(),
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
			rate_limits: BTreeMap::new(),
			providers: ProvidersConfig::default(),
		}
	}
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	raw.parse().map_err(|e| ConfigError::invalid_setting(name, e))
}

fn redirect(provider: ProviderKind, raw: Option<String>) -> Result<Url, ConfigError> {
	let raw = raw.ok_or(ConfigError::MissingCredential { provider, field: "redirect_uri" })?;

	Url::parse(&raw).map_err(|source| ConfigError::InvalidRedirect { source })
}

fn oauth_client<F>(
	provider: ProviderKind,
	prefix: &str,
	var: &F,
) -> Result<Option<OAuthClientConfig>, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let Some(client_id) = var(&format!("{prefix}_CLIENT_ID")) else {
		return Ok(None);
	};
	let client_secret = var(&format!("{prefix}_CLIENT_SECRET"))
		.ok_or(ConfigError::MissingCredential { provider, field: "client_secret" })?;
	let redirect_uri = redirect(provider, var(&format!("{prefix}_REDIRECT_URI")))?;

	Ok(Some(OAuthClientConfig { client_id, client_secret, redirect_uri }))
}
