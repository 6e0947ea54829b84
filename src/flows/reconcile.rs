//! Maps provider records onto catalog games and listings.
//!
//! Identity is `(provider, external id)` and nothing else: the same title owned on two
//! storefronts produces two catalog games. Merging across storefronts needs an explicit,
//! user-confirmed step and is intentionally not attempted here.

// self
use crate::{
	_prelude::*,
	auth::{ExternalGameId, ProviderKind},
	model::{ListingKey, ListingUpdate, ReconciledListing},
	provider::ProviderGameRecord,
	store::SyncStore,
};

/// Upserts catalog rows for provider records.
#[derive(Clone)]
pub struct CatalogReconciler {
	store: Arc<dyn SyncStore>,
}
impl CatalogReconciler {
	/// Creates a reconciler writing through `store`.
	pub fn new(store: Arc<dyn SyncStore>) -> Self {
		Self { store }
	}

	/// Finds or creates the listing for one record and refreshes its mutable fields.
	///
	/// Records whose identifier or title cannot be used are reported as
	/// [`Error::ReconciliationConflict`] without touching the store.
	pub async fn reconcile(
		&self,
		provider: ProviderKind,
		record: &ProviderGameRecord,
		now: OffsetDateTime,
	) -> Result<ReconciledListing> {
		let key = listing_key(provider, record)?;
		let update = ListingUpdate::from_record(record, now);
		let reconciled = self.store.reconcile_listing(&key, record, update).await?;

		if reconciled.created {
			tracing::debug!(
				listing = %key,
				game_id = %reconciled.listing.game_id,
				"Catalog game created."
			);
		}

		Ok(reconciled)
	}

	/// Reconciles records in provider order; one bad record never stops the rest.
	pub async fn reconcile_batch(
		&self,
		provider: ProviderKind,
		records: &[ProviderGameRecord],
		now: OffsetDateTime,
	) -> Vec<Result<ReconciledListing>> {
		let mut results = Vec::with_capacity(records.len());

		for record in records {
			results.push(self.reconcile(provider, record, now).await);
		}

		results
	}
}
impl Debug for CatalogReconciler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CatalogReconciler").finish_non_exhaustive()
	}
}

/// Validates the record identity and builds its listing key.
pub fn listing_key(provider: ProviderKind, record: &ProviderGameRecord) -> Result<ListingKey> {
	let external_id = ExternalGameId::new(&record.external_id).map_err(|e| {
		Error::ReconciliationConflict { reason: format!("unusable {provider} game id: {e}") }
	})?;

	if record.name.trim().is_empty() {
		return Err(Error::ReconciliationConflict {
			reason: format!("{provider} game `{external_id}` has no title"),
		});
	}

	Ok(ListingKey::new(provider, external_id))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{provider::PriceQuote, store::MemoryStore};

	fn reconciler() -> (CatalogReconciler, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());

		(CatalogReconciler::new(store.clone()), store)
	}

	#[tokio::test]
	async fn reconciling_twice_keeps_one_game() {
		let (reconciler, store) = reconciler();
		let record =
			ProviderGameRecord::new("10", "Game A").with_price(PriceQuote::flat("USD", 1999));
		let now = OffsetDateTime::UNIX_EPOCH;
		let first = reconciler
			.reconcile(ProviderKind::Steam, &record, now)
			.await
			.expect("First reconcile should succeed.");
		let second = reconciler
			.reconcile(ProviderKind::Steam, &record, now + Duration::minutes(5))
			.await
			.expect("Second reconcile should succeed.");
		let counts = store.counts().await.expect("Counting rows should succeed.");

		assert!(first.created);
		assert!(!second.created);
		assert_eq!(first.listing.game_id, second.listing.game_id);
		assert_eq!(second.listing.last_checked_at, now + Duration::minutes(5));
		assert_eq!(counts.catalog_games, 1);
		assert_eq!(counts.listings, 1);
	}

	#[tokio::test]
	async fn same_title_on_two_storefronts_stays_separate() {
		let (reconciler, store) = reconciler();
		let record = ProviderGameRecord::new("1207658924", "The Witcher");
		let now = OffsetDateTime::UNIX_EPOCH;
		let steam = reconciler
			.reconcile(ProviderKind::Steam, &record, now)
			.await
			.expect("Steam reconcile should succeed.");
		let gog = reconciler
			.reconcile(ProviderKind::Gog, &record, now)
			.await
			.expect("GOG reconcile should succeed.");

		assert_ne!(steam.listing.game_id, gog.listing.game_id);
		assert_eq!(store.counts().await.expect("Counting rows should succeed.").catalog_games, 2);
	}

	#[tokio::test]
	async fn bad_records_are_conflicts_and_do_not_stop_the_batch() {
		let (reconciler, store) = reconciler();
		let records = vec![
			ProviderGameRecord::new("", "Nameless id"),
			ProviderGameRecord::new("2", "   "),
			ProviderGameRecord::new("3", "Good"),
		];
		let now = OffsetDateTime::UNIX_EPOCH;
		let results = reconciler.reconcile_batch(ProviderKind::Gog, &records, now).await;

		assert!(matches!(results[0], Err(Error::ReconciliationConflict { .. })));
		assert!(matches!(results[1], Err(Error::ReconciliationConflict { .. })));
		assert!(results[2].is_ok());
		assert_eq!(store.counts().await.expect("Counting rows should succeed.").listings, 1);
	}
}
