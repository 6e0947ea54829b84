//! In-process table set shared by the built-in stores.
//!
//! The methods here are the synchronous bodies of the [`crate::store::SyncStore`]
//! operations; backends wrap them in their own lock and persistence.

// self
use crate::{
	_prelude::*,
	auth::UserId,
	model::{
		AccountKey, AccountPatch, CatalogGame, CatalogGameId, LibraryEntryUpdate, LibraryKey,
		ListingKey, ListingUpdate, PriceKey, PriceObservation, PricePoint, ProviderListing,
		ReconciledListing, UserLibraryEntry, UserStoreAccount, WishlistEntry, WishlistKey,
	},
	provider::ProviderGameRecord,
	store::LibraryUpsert,
};

/// Row counts per table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
	/// Catalog games.
	pub catalog_games: usize,
	/// Provider listings.
	pub listings: usize,
	/// Library entries.
	pub library_entries: usize,
	/// Linked accounts.
	pub accounts: usize,
	/// Price points.
	pub price_points: usize,
	/// Wishlist entries.
	pub wishlist_entries: usize,
}

/// Every table keyed by its natural identity.
#[derive(Clone, Debug, Default)]
pub struct Tables {
	next_game_id: u64,
	games: BTreeMap<CatalogGameId, CatalogGame>,
	listings: BTreeMap<ListingKey, ProviderListing>,
	library: BTreeMap<LibraryKey, UserLibraryEntry>,
	accounts: BTreeMap<AccountKey, UserStoreAccount>,
	prices: BTreeMap<PriceKey, PricePoint>,
	wishlist: BTreeMap<WishlistKey, WishlistEntry>,
}
impl Tables {
	/// Rebuilds the tables from a persisted snapshot.
	pub fn from_snapshot(snapshot: Snapshot) -> Self {
		let games: BTreeMap<_, _> =
			snapshot.games.into_iter().map(|game| (game.id, game)).collect();
		let highest = games.keys().next_back().map_or(0, |id| id.0);

		Self {
			next_game_id: snapshot.next_game_id.max(highest),
			games,
			listings: snapshot.listings.into_iter().map(|row| (row.key.clone(), row)).collect(),
			library: snapshot.library.into_iter().map(|row| (row.key.clone(), row)).collect(),
			accounts: snapshot.accounts.into_iter().map(|row| (row.key.clone(), row)).collect(),
			prices: snapshot.prices.into_iter().map(|row| (row.key.clone(), row)).collect(),
			wishlist: snapshot.wishlist.into_iter().map(|row| (row.key.clone(), row)).collect(),
		}
	}

	/// Copies the tables into a serializable snapshot.
	pub fn snapshot(&self) -> Snapshot {
		Snapshot {
			next_game_id: self.next_game_id,
			games: self.games.values().cloned().collect(),
			listings: self.listings.values().cloned().collect(),
			library: self.library.values().cloned().collect(),
			accounts: self.accounts.values().cloned().collect(),
			prices: self.prices.values().cloned().collect(),
			wishlist: self.wishlist.values().cloned().collect(),
		}
	}

	pub(crate) fn reconcile_listing(
		&mut self,
		key: &ListingKey,
		record: &ProviderGameRecord,
		update: ListingUpdate,
	) -> ReconciledListing {
		if let Some(listing) = self.listings.get_mut(key) {
			update.apply(listing);

			return ReconciledListing { listing: listing.clone(), created: false };
		}

		self.next_game_id += 1;

		let game_id = CatalogGameId(self.next_game_id);
		let listing = ProviderListing {
			key: key.clone(),
			game_id,
			store_url: update.store_url,
			price: update.price,
			available: update.available,
			last_checked_at: update.checked_at,
		};

		self.games.insert(game_id, CatalogGame::from_record(game_id, record, update.checked_at));
		self.listings.insert(key.clone(), listing.clone());

		ReconciledListing { listing, created: true }
	}

	pub(crate) fn fetch_listing(&self, key: &ListingKey) -> Option<ProviderListing> {
		self.listings.get(key).cloned()
	}

	pub(crate) fn update_listing_price(
		&mut self,
		key: &ListingKey,
		update: ListingUpdate,
	) -> Option<ProviderListing> {
		let listing = self.listings.get_mut(key)?;

		listing.price = update.price;
		listing.available = update.available;
		listing.last_checked_at = update.checked_at;

		Some(listing.clone())
	}

	pub(crate) fn fetch_catalog_game(&self, id: CatalogGameId) -> Option<CatalogGame> {
		self.games.get(&id).cloned()
	}

	pub(crate) fn list_listings_for_game(&self, id: CatalogGameId) -> Vec<ProviderListing> {
		self.listings.values().filter(|listing| listing.game_id == id).cloned().collect()
	}

	pub(crate) fn upsert_library_entry(&mut self, entry: UserLibraryEntry) -> LibraryUpsert {
		match self.library.get_mut(&entry.key) {
			Some(existing) =>
				if existing.refresh_from(&entry) {
					LibraryUpsert::Updated
				} else {
					LibraryUpsert::Unchanged
				},
			None => {
				self.library.insert(entry.key.clone(), entry);

				LibraryUpsert::Created
			},
		}
	}

	pub(crate) fn fetch_library_entry(&self, key: &LibraryKey) -> Option<UserLibraryEntry> {
		self.library.get(key).cloned()
	}

	pub(crate) fn update_library_entry(
		&mut self,
		key: &LibraryKey,
		update: &LibraryEntryUpdate,
		now: OffsetDateTime,
	) -> Option<UserLibraryEntry> {
		let entry = self.library.get_mut(key)?;

		update.apply(entry, now);

		Some(entry.clone())
	}

	pub(crate) fn list_library(&self, user: &UserId) -> Vec<UserLibraryEntry> {
		self.library.values().filter(|entry| &entry.key.user == user).cloned().collect()
	}

	pub(crate) fn save_account(&mut self, account: UserStoreAccount) {
		self.accounts.insert(account.key.clone(), account);
	}

	pub(crate) fn fetch_account(&self, key: &AccountKey) -> Option<UserStoreAccount> {
		self.accounts.get(key).cloned()
	}

	pub(crate) fn list_accounts(&self, user: &UserId) -> Vec<UserStoreAccount> {
		self.accounts.values().filter(|account| &account.key.user == user).cloned().collect()
	}

	pub(crate) fn patch_account(
		&mut self,
		key: &AccountKey,
		patch: AccountPatch,
		now: OffsetDateTime,
	) -> Option<UserStoreAccount> {
		let account = self.accounts.get_mut(key)?;

		patch.apply(account, now);

		Some(account.clone())
	}

	pub(crate) fn delete_account(&mut self, key: &AccountKey) -> bool {
		self.accounts.remove(key).is_some()
	}

	pub(crate) fn fetch_price_point(&self, key: &PriceKey) -> Option<PricePoint> {
		self.prices.get(key).cloned()
	}

	pub(crate) fn record_price_observation(
		&mut self,
		key: &PriceKey,
		observation: PriceObservation,
	) -> PricePoint {
		let existing = self.prices.remove(key);
		let point = PricePoint::observe(existing, key.clone(), observation);

		self.prices.insert(key.clone(), point.clone());

		point
	}

	pub(crate) fn upsert_wishlist_entry(&mut self, entry: WishlistEntry) {
		self.wishlist.insert(entry.key.clone(), entry);
	}

	pub(crate) fn remove_wishlist_entry(&mut self, key: &WishlistKey) -> bool {
		self.wishlist.remove(key).is_some()
	}

	pub(crate) fn list_wishlist(&self, user: &UserId) -> Vec<WishlistEntry> {
		let mut entries: Vec<_> =
			self.wishlist.values().filter(|entry| &entry.key.user == user).cloned().collect();

		entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.added_at.cmp(&b.added_at)));

		entries
	}

	pub(crate) fn counts(&self) -> StoreCounts {
		StoreCounts {
			catalog_games: self.games.len(),
			listings: self.listings.len(),
			library_entries: self.library.len(),
			accounts: self.accounts.len(),
			price_points: self.prices.len(),
			wishlist_entries: self.wishlist.len(),
		}
	}
}

/// Serializable form of [`Tables`]; every row carries its own key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
	/// Highest catalog id handed out so far.
	pub next_game_id: u64,
	/// Catalog games.
	pub games: Vec<CatalogGame>,
	/// Provider listings.
	pub listings: Vec<ProviderListing>,
	/// Library entries.
	pub library: Vec<UserLibraryEntry>,
	/// Linked accounts.
	pub accounts: Vec<UserStoreAccount>,
	/// Price points.
	pub prices: Vec<PricePoint>,
	/// Wishlist entries.
	pub wishlist: Vec<WishlistEntry>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{ExternalGameId, ProviderKind},
		provider::PriceQuote,
	};

	fn key(id: &str) -> ListingKey {
		ListingKey::new(
			ProviderKind::Steam,
			ExternalGameId::new(id).expect("Game fixture should be valid."),
		)
	}

	fn reconcile(tables: &mut Tables, id: &str, price: i64) -> ReconciledListing {
		let record = ProviderGameRecord::new(id, "Game").with_price(PriceQuote::flat("USD", price));
		let update = ListingUpdate::from_record(&record, OffsetDateTime::UNIX_EPOCH);

		tables.reconcile_listing(&key(id), &record, update)
	}

	#[test]
	fn reconciliation_reuses_the_catalog_game() {
		let mut tables = Tables::default();
		let first = reconcile(&mut tables, "10", 1_999);
		let second = reconcile(&mut tables, "10", 999);

		assert!(first.created);
		assert!(!second.created);
		assert_eq!(first.listing.game_id, second.listing.game_id);
		assert_eq!(second.listing.price, Some(PriceQuote::flat("USD", 999)));
		assert_eq!(tables.counts().catalog_games, 1);
		assert_eq!(tables.counts().listings, 1);
	}

	#[test]
	fn snapshots_preserve_id_allocation() {
		let mut tables = Tables::default();

		reconcile(&mut tables, "10", 1_999);
		reconcile(&mut tables, "20", 4_999);

		let mut restored = Tables::from_snapshot(tables.snapshot());
		let third = reconcile(&mut restored, "30", 999);

		assert_eq!(third.listing.game_id, CatalogGameId(3));
		assert_eq!(restored.counts().catalog_games, 3);
	}
}
