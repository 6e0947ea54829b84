//! Thread-safe in-memory [`SyncStore`] implementation for local development and tests.

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
	store::{LibraryUpsert, StoreCounts, StoreFuture, SyncStore, Tables},
};

/// Thread-safe storage backend that keeps every table in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Tables>>);
impl MemoryStore {
	fn read<'a, T, F>(&'a self, f: F) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
		F: 'a + Send + FnOnce(&Tables) -> T,
	{
		Box::pin(async move { Ok(f(&self.0.read())) })
	}

	fn write<'a, T, F>(&'a self, f: F) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
		F: 'a + Send + FnOnce(&mut Tables) -> T,
	{
		Box::pin(async move { Ok(f(&mut self.0.write())) })
	}
}
impl SyncStore for MemoryStore {
	fn reconcile_listing<'a>(
		&'a self,
		key: &'a ListingKey,
		record: &'a ProviderGameRecord,
		update: ListingUpdate,
	) -> StoreFuture<'a, ReconciledListing> {
		self.write(move |tables| tables.reconcile_listing(key, record, update))
	}

	fn fetch_listing<'a>(
		&'a self,
		key: &'a ListingKey,
	) -> StoreFuture<'a, Option<ProviderListing>> {
		self.read(move |tables| tables.fetch_listing(key))
	}

	fn update_listing_price<'a>(
		&'a self,
		key: &'a ListingKey,
		update: ListingUpdate,
	) -> StoreFuture<'a, Option<ProviderListing>> {
		self.write(move |tables| tables.update_listing_price(key, update))
	}

	fn fetch_catalog_game(&self, id: CatalogGameId) -> StoreFuture<'_, Option<CatalogGame>> {
		self.read(move |tables| tables.fetch_catalog_game(id))
	}

	fn list_listings_for_game(&self, id: CatalogGameId) -> StoreFuture<'_, Vec<ProviderListing>> {
		self.read(move |tables| tables.list_listings_for_game(id))
	}

	fn upsert_library_entry(&self, entry: UserLibraryEntry) -> StoreFuture<'_, LibraryUpsert> {
		self.write(move |tables| tables.upsert_library_entry(entry))
	}

	fn fetch_library_entry<'a>(
		&'a self,
		key: &'a LibraryKey,
	) -> StoreFuture<'a, Option<UserLibraryEntry>> {
		self.read(move |tables| tables.fetch_library_entry(key))
	}

	fn update_library_entry<'a>(
		&'a self,
		key: &'a LibraryKey,
		update: &'a LibraryEntryUpdate,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<UserLibraryEntry>> {
		self.write(move |tables| tables.update_library_entry(key, update, now))
	}

	fn list_library<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<UserLibraryEntry>> {
		self.read(move |tables| tables.list_library(user))
	}

	fn save_account(&self, account: UserStoreAccount) -> StoreFuture<'_, ()> {
		self.write(move |tables| tables.save_account(account))
	}

	fn fetch_account<'a>(
		&'a self,
		key: &'a AccountKey,
	) -> StoreFuture<'a, Option<UserStoreAccount>> {
		self.read(move |tables| tables.fetch_account(key))
	}

	fn list_accounts<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<UserStoreAccount>> {
		self.read(move |tables| tables.list_accounts(user))
	}

	fn patch_account<'a>(
		&'a self,
		key: &'a AccountKey,
		patch: AccountPatch,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<UserStoreAccount>> {
		self.write(move |tables| tables.patch_account(key, patch, now))
	}

	fn delete_account<'a>(&'a self, key: &'a AccountKey) -> StoreFuture<'a, bool> {
		self.write(move |tables| tables.delete_account(key))
	}

	fn fetch_price_point<'a>(&'a self, key: &'a PriceKey) -> StoreFuture<'a, Option<PricePoint>> {
		self.read(move |tables| tables.fetch_price_point(key))
	}

	fn record_price_observation<'a>(
		&'a self,
		key: &'a PriceKey,
		observation: PriceObservation,
	) -> StoreFuture<'a, PricePoint> {
		self.write(move |tables| tables.record_price_observation(key, observation))
	}

	fn upsert_wishlist_entry(&self, entry: WishlistEntry) -> StoreFuture<'_, ()> {
		self.write(move |tables| tables.upsert_wishlist_entry(entry))
	}

	fn remove_wishlist_entry<'a>(&'a self, key: &'a WishlistKey) -> StoreFuture<'a, bool> {
		self.write(move |tables| tables.remove_wishlist_entry(key))
	}

	fn list_wishlist<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<WishlistEntry>> {
		self.read(move |tables| tables.list_wishlist(user))
	}

	fn counts(&self) -> StoreFuture<'_, StoreCounts> {
		self.read(Tables::counts)
	}
}
