//! Explicitly constructed map from provider kind to storefront client.
//!
//! The registry is the only component that knows which storefronts are wired up. It is
//! built once (usually from [`EngineConfig`]) and handed to the engine; there is no global
//! instance. Adding a storefront means registering one more [`StoreProvider`].

// crates.io
use tokio::task::JoinSet;
// self
use crate::{
	_prelude::*,
	auth::ProviderKind,
	config::EngineConfig,
	error::ConfigError,
	ext::Cancellation,
	http::StoreHttpClient,
	provider::{
		Capability, EpicProvider, GogProvider, ProviderDescriptor, ProviderGameRecord,
		ProviderTransport, SteamProvider, StoreProvider,
	},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Operation label reported when a provider is not registered at all.
pub const UNREGISTERED: &str = "integration";

/// Provider clients keyed by kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
	providers: BTreeMap<ProviderKind, Arc<dyn StoreProvider>>,
}
impl ProviderRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the production clients named in `config` over reqwest.
	#[cfg(feature = "reqwest")]
	pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
		let http = ReqwestHttpClient::new(config.request_timeout())?;

		Self::from_config_with_http_client(config, Arc::new(http))
	}

	/// Builds the production clients named in `config` over a caller-supplied transport.
	///
	/// Storefronts without credentials are skipped; endpoint overrides are applied and
	/// revalidated before any client is constructed.
	pub fn from_config_with_http_client(
		config: &EngineConfig,
		http: Arc<dyn StoreHttpClient>,
	) -> Result<Self, ConfigError> {
		let transport = |kind| {
			ProviderTransport::new(
				kind,
				http.clone(),
				config.rate_limit(kind),
				config.request_timeout(),
			)
		};
		let descriptor = |kind, base: ProviderDescriptor| match config.endpoint_overrides(kind) {
			Some(overrides) => overrides.apply(base),
			None => Ok(base),
		};
		let mut registry = Self::new();

		if let Some(steam) = &config.providers.steam {
			let kind = ProviderKind::Steam;
			let descriptor = descriptor(kind, ProviderDescriptor::steam()?)?;

			registry.register(Arc::new(SteamProvider::new(descriptor, steam, transport(kind))));
		}
		if let Some(gog) = &config.providers.gog {
			let kind = ProviderKind::Gog;
			let descriptor = descriptor(kind, ProviderDescriptor::gog()?)?;

			registry.register(Arc::new(GogProvider::new(descriptor, gog, transport(kind))?));
		}
		if let Some(epic) = &config.providers.epic {
			let kind = ProviderKind::Epic;
			let descriptor = descriptor(kind, ProviderDescriptor::epic()?)?;

			registry.register(Arc::new(EpicProvider::new(descriptor, epic, transport(kind))?));
		}

		tracing::info!(providers = ?registry.kinds(), "Provider registry built.");

		Ok(registry)
	}

	/// Adds a provider, returning the registry for chaining.
	pub fn with_provider(mut self, provider: Arc<dyn StoreProvider>) -> Self {
		self.register(provider);

		self
	}

	/// Adds or replaces the provider for its kind.
	pub fn register(&mut self, provider: Arc<dyn StoreProvider>) {
		self.providers.insert(provider.kind(), provider);
	}

	/// Looks up a provider; unregistered kinds yield [`Error::Unsupported`].
	pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn StoreProvider>> {
		self.providers
			.get(&kind)
			.cloned()
			.ok_or(Error::Unsupported { provider: kind, operation: UNREGISTERED })
	}

	/// Returns true when `kind` is registered.
	pub fn contains(&self, kind: ProviderKind) -> bool {
		self.providers.contains_key(&kind)
	}

	/// Registered kinds in stable order.
	pub fn kinds(&self) -> Vec<ProviderKind> {
		self.providers.keys().copied().collect()
	}

	/// Searches every registered storefront concurrently.
	///
	/// Providers without a search API and providers that fail are reported separately;
	/// one storefront never fails the whole search.
	pub async fn search_all(
		&self,
		query: &str,
		limit: usize,
		cancel: &Cancellation,
	) -> CrossStoreSearch {
		let mut tasks = JoinSet::new();

		for (kind, provider) in &self.providers {
			let kind = *kind;
			let provider = provider.clone();
			let query = query.to_owned();
			let cancel = cancel.clone();

			tasks.spawn(async move {
				(kind, provider.search_games(&query, limit, &cancel).await)
			});
		}

		let mut search = CrossStoreSearch::default();

		while let Some(joined) = tasks.join_next().await {
			let (kind, outcome) = match joined {
				Ok(pair) => pair,
				Err(e) => {
					tracing::warn!(error = %e, "Search task aborted.");

					continue;
				},
			};

			match outcome {
				Ok(Capability::Supported(records)) => {
					search.results.insert(kind, records);
				},
				Ok(Capability::Unsupported) => search.unsupported.push(kind),
				Err(e) => {
					tracing::warn!(provider = %kind, error = %e, "Provider search failed.");

					search.failures.insert(kind, e);
				},
			}
		}

		search.unsupported.sort();

		search
	}
}
impl Debug for ProviderRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderRegistry").field("providers", &self.kinds()).finish()
	}
}

/// Per-provider outcome of [`ProviderRegistry::search_all`].
#[derive(Debug, Default)]
pub struct CrossStoreSearch {
	/// Results from providers that answered, in provider order.
	pub results: BTreeMap<ProviderKind, Vec<ProviderGameRecord>>,
	/// Providers without a search API.
	pub unsupported: Vec<ProviderKind>,
	/// Providers whose search failed.
	pub failures: BTreeMap<ProviderKind, Error>,
}
impl CrossStoreSearch {
	/// Total number of records across providers.
	pub fn total(&self) -> usize {
		self.results.values().map(Vec::len).sum()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provider::{ScriptedFailure, ScriptedProvider};

	#[test]
	fn unregistered_providers_are_unsupported() {
		let gog = Arc::new(ScriptedProvider::new(ProviderKind::Gog));
		let registry = ProviderRegistry::new().with_provider(gog);

		assert!(registry.get(ProviderKind::Gog).is_ok());
		assert!(matches!(
			registry.get(ProviderKind::Xbox),
			Err(Error::Unsupported { provider: ProviderKind::Xbox, operation: UNREGISTERED })
		));
		assert_eq!(registry.kinds(), vec![ProviderKind::Gog]);
	}

	#[tokio::test]
	async fn search_all_separates_unsupported_and_failed_providers() {
		let gog = ScriptedProvider::new(ProviderKind::Gog);
		let steam = ScriptedProvider::new(ProviderKind::Steam);

		gog.set_search(vec![ProviderGameRecord::new("1", "Gwent")]);
		steam.set_search(Vec::new());

		let xbox = ScriptedProvider::new(ProviderKind::Xbox);

		xbox.set_search(vec![ProviderGameRecord::new("9", "Gwent")]);
		xbox.fail_next_search(ScriptedFailure::Transient);

		let registry = ProviderRegistry::new()
			.with_provider(Arc::new(gog))
			.with_provider(Arc::new(steam))
			.with_provider(Arc::new(xbox))
			.with_provider(Arc::new(ScriptedProvider::new(ProviderKind::Epic)));
		let search = registry.search_all("gw", 10, &Cancellation::new()).await;

		assert_eq!(search.total(), 1);
		assert_eq!(search.results.get(&ProviderKind::Steam).map(Vec::len), Some(0));
		assert_eq!(search.unsupported, vec![ProviderKind::Epic]);
		assert!(matches!(search.failures.get(&ProviderKind::Xbox), Some(Error::Transient(_))));
	}
}
