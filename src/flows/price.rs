//! TTL-gated price lookups with a monotonic all-time low.
//!
//! Fresh points are served from the store without touching the storefront. Stale or forced
//! lookups take a per-key guard so concurrent callers for the same key share one fetch. A
//! failed fetch leaves the stored point (and its fetch time) exactly as it was.

// crates.io
use tokio::task::JoinSet;
// self
use crate::{
	_prelude::*,
	auth::{ExternalGameId, ProviderKind, RegionCode},
	ext::Cancellation,
	flows::SyncEngine,
	model::{ListingUpdate, PriceKey, PriceObservation, PricePoint},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderOperation,
};

/// Parameters for [`SyncEngine::get_price`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceRequest {
	/// Storefront.
	pub provider: ProviderKind,
	/// Storefront-native identifier.
	pub external_id: ExternalGameId,
	/// Pricing region; the engine default when `None`.
	pub region: Option<RegionCode>,
	/// Skip the freshness gate.
	pub force: bool,
}
impl PriceRequest {
	/// Creates a request for the default region.
	pub fn new(provider: ProviderKind, external_id: ExternalGameId) -> Self {
		Self { provider, external_id, region: None, force: false }
	}

	/// Targets a specific region.
	pub fn with_region(mut self, region: RegionCode) -> Self {
		self.region = Some(region);

		self
	}

	/// Bypasses the cached value.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}
}

/// Where a [`PriceLookup`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceSource {
	/// Served from the store within the TTL.
	Cached,
	/// Fetched from the storefront.
	Fetched,
}

/// Answer to a price request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceLookup {
	/// Stored state after the lookup.
	pub point: PricePoint,
	/// Whether the storefront was called.
	pub source: PriceSource,
}

/// Outcome of [`SyncEngine::refresh_stale_prices`].
#[derive(Debug, Default)]
pub struct PriceRefreshReport {
	/// Keys fetched from their storefront.
	pub fetched: usize,
	/// Keys still within the TTL.
	pub fresh: usize,
	/// Keys whose storefront has no price API.
	pub unsupported: Vec<PriceKey>,
	/// Keys whose fetch failed.
	pub failures: Vec<(PriceKey, Error)>,
}

impl SyncEngine {
	/// Returns the price for the requested key, fetching only when the cache is stale.
	pub async fn get_price(&self, request: PriceRequest) -> Result<PriceLookup> {
		self.get_price_with(request, &Cancellation::new()).await
	}

	/// Same as [`SyncEngine::get_price`] with a caller-owned cancellation signal.
	///
	/// Storefronts without a price API yield [`Error::Unsupported`]. Observations in the
	/// default region also update the listing's displayed price.
	pub async fn get_price_with(
		&self,
		request: PriceRequest,
		cancel: &Cancellation,
	) -> Result<PriceLookup> {
		const KIND: FlowKind = FlowKind::PriceRefresh;

		let PriceRequest { provider, external_id, region, force } = request;
		let region = region.unwrap_or_else(|| self.config.default_region.clone());
		let key = PriceKey::new(provider, external_id, region);

		if !force && let Some(point) = self.fresh_price_point(&key).await? {
			return Ok(PriceLookup { point, source: PriceSource::Cached });
		}

		let span = FlowSpan::for_provider(KIND, "get_price", provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let client = self.registry.get(provider)?;
				let _singleflight = self.price_guards.lock(&key).await;

				// Another caller may have fetched while this one waited.
				if !force && let Some(point) = self.fresh_price_point(&key).await? {
					return Ok(PriceLookup { point, source: PriceSource::Cached });
				}

				let quote = client
					.fetch_game_price(&key.external_id, &key.region, cancel)
					.await
					.inspect_err(|e| {
						tracing::warn!(price = %key, error = %e, "Price fetch failed; cache kept.");
					})?
					.into_result(provider, ProviderOperation::Price)?;
				let now = self.now();
				let observation = PriceObservation::new(quote.clone(), now);
				let point = self.store.record_price_observation(&key, observation).await?;

				if key.region == self.config.default_region {
					let update = ListingUpdate {
						store_url: None,
						available: quote.is_some(),
						price: quote,
						checked_at: now,
					};

					self.store.update_listing_price(&key.listing(), update).await?;
				}

				tracing::debug!(
					price = %key,
					lowest = ?point.lowest_final_minor,
					"Price observation recorded."
				);

				Ok(PriceLookup { point, source: PriceSource::Fetched })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Stored price point, regardless of age.
	pub async fn price_point(&self, key: &PriceKey) -> Result<Option<PricePoint>> {
		Ok(self.store.fetch_price_point(key).await?)
	}

	/// Refreshes every stale key concurrently, collecting per-key failures.
	pub async fn refresh_stale_prices(&self, keys: Vec<PriceKey>) -> PriceRefreshReport {
		let mut tasks = JoinSet::new();

		for key in keys {
			let engine = self.clone();

			tasks.spawn(async move {
				let request = PriceRequest::new(key.provider, key.external_id.clone())
					.with_region(key.region.clone());
				let lookup = engine.get_price(request).await;

				(key, lookup)
			});
		}

		let mut report = PriceRefreshReport::default();

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((_, Ok(PriceLookup { source: PriceSource::Cached, .. }))) => report.fresh += 1,
				Ok((_, Ok(PriceLookup { source: PriceSource::Fetched, .. }))) =>
					report.fetched += 1,
				Ok((key, Err(Error::Unsupported { .. }))) => report.unsupported.push(key),
				Ok((key, Err(e))) => report.failures.push((key, e)),
				Err(e) => tracing::warn!(error = %e, "Price refresh task aborted."),
			}
		}

		report.unsupported.sort();

		report
	}

	async fn fresh_price_point(&self, key: &PriceKey) -> Result<Option<PricePoint>> {
		let ttl = self.config.price_ttl();
		let now = self.now();
		let point = self.store.fetch_price_point(key).await?;

		Ok(point.filter(|point| point.is_fresh(ttl, now)))
	}
}
