//! High-level orchestration powered by the [`SyncEngine`] facade.
//!
//! The engine owns the provider registry, the store, and the credential vault, so each flow
//! (account linking, library sync, price tracking, wishlist alerts) can focus on its own
//! state transitions. Nothing here is global: every collaborator is injected at
//! construction and shared through `Arc`s, which makes the engine cheap to clone into
//! spawned tasks.

pub mod common;
pub mod connect;
pub mod library;
pub mod price;
pub mod reconcile;
pub mod wishlist;

pub use common::*;
pub use connect::*;
pub use library::*;
pub use price::*;
pub use reconcile::*;

// self
use crate::{
	_prelude::*,
	config::EngineConfig,
	model::{AccountKey, PriceKey},
	registry::ProviderRegistry,
	store::SyncStore,
	vault::CredentialVault,
};

/// Source of "now" for freshness and bookkeeping decisions.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Coordinates storefront flows for every user and provider.
#[derive(Clone)]
pub struct SyncEngine {
	/// Registered storefront clients.
	pub registry: Arc<ProviderRegistry>,
	/// Persistence backend.
	pub store: Arc<dyn SyncStore>,
	/// Engine settings.
	pub config: Arc<EngineConfig>,
	/// Shared counters for library sync outcomes.
	pub sync_metrics: Arc<SyncMetrics>,
	vault: Arc<CredentialVault>,
	reconciler: CatalogReconciler,
	tracker: SyncTracker,
	refresh_guards: KeyedGuards<AccountKey>,
	price_guards: KeyedGuards<PriceKey>,
	clock: Clock,
}
impl SyncEngine {
	/// Creates an engine over the provided collaborators.
	pub fn new(
		registry: impl Into<Arc<ProviderRegistry>>,
		store: Arc<dyn SyncStore>,
		vault: CredentialVault,
		config: EngineConfig,
	) -> Self {
		Self {
			registry: registry.into(),
			reconciler: CatalogReconciler::new(store.clone()),
			store,
			config: Arc::new(config),
			sync_metrics: Default::default(),
			vault: Arc::new(vault),
			tracker: Default::default(),
			refresh_guards: Default::default(),
			price_guards: Default::default(),
			clock: Arc::new(OffsetDateTime::now_utc),
		}
	}

	/// Replaces the wall clock (tests, replays).
	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = clock;

		self
	}

	/// Reconciler used by library syncs.
	pub fn reconciler(&self) -> &CatalogReconciler {
		&self.reconciler
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		(self.clock)()
	}

	pub(crate) fn vault(&self) -> &CredentialVault {
		&self.vault
	}
}
impl Debug for SyncEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SyncEngine")
			.field("registry", &self.registry)
			.field("config", &self.config)
			.field("vault", &self.vault)
			.finish()
	}
}
