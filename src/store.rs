//! Storage contracts and built-in store implementations for catalog, library, account, and
//! price rows.
//!
//! Every mutating operation is a single-row upsert keyed by natural identity and is atomic
//! on its own; callers never rely on cross-row transactions. Reconciliation is the one
//! compound write (catalog game plus listing) and backends must perform it under one lock.

pub mod file;
pub mod memory;
pub mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use tables::{StoreCounts, Tables};

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
};

/// Boxed future returned by [`SyncStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract consumed by the reconciler and the flows.
pub trait SyncStore
where
	Self: Send + Sync,
{
	/// Finds the listing for `key` or creates a catalog game and listing from `record`.
	///
	/// Existing listings only have their mutable fields refreshed; their catalog game never
	/// changes.
	fn reconcile_listing<'a>(
		&'a self,
		key: &'a ListingKey,
		record: &'a ProviderGameRecord,
		update: ListingUpdate,
	) -> StoreFuture<'a, ReconciledListing>;

	/// Fetches a listing by identity.
	fn fetch_listing<'a>(&'a self, key: &'a ListingKey) -> StoreFuture<'a, Option<ProviderListing>>;

	/// Replaces a listing's price and check time, returning the updated row.
	fn update_listing_price<'a>(
		&'a self,
		key: &'a ListingKey,
		update: ListingUpdate,
	) -> StoreFuture<'a, Option<ProviderListing>>;

	/// Fetches a catalog game.
	fn fetch_catalog_game(&self, id: CatalogGameId) -> StoreFuture<'_, Option<CatalogGame>>;

	/// Lists every listing attached to a catalog game.
	fn list_listings_for_game(&self, id: CatalogGameId) -> StoreFuture<'_, Vec<ProviderListing>>;

	/// Inserts an imported library entry or refreshes its provider-sourced fields.
	fn upsert_library_entry(&self, entry: UserLibraryEntry) -> StoreFuture<'_, LibraryUpsert>;

	/// Fetches a library entry.
	fn fetch_library_entry<'a>(
		&'a self,
		key: &'a LibraryKey,
	) -> StoreFuture<'a, Option<UserLibraryEntry>>;

	/// Applies a user edit, returning the updated entry when it exists.
	fn update_library_entry<'a>(
		&'a self,
		key: &'a LibraryKey,
		update: &'a LibraryEntryUpdate,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<UserLibraryEntry>>;

	/// Lists a user's library across providers.
	fn list_library<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<UserLibraryEntry>>;

	/// Persists or replaces a linked account.
	fn save_account(&self, account: UserStoreAccount) -> StoreFuture<'_, ()>;

	/// Fetches a linked account.
	fn fetch_account<'a>(
		&'a self,
		key: &'a AccountKey,
	) -> StoreFuture<'a, Option<UserStoreAccount>>;

	/// Lists a user's linked accounts.
	fn list_accounts<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<UserStoreAccount>>;

	/// Applies a targeted mutation, returning the updated account when it exists.
	fn patch_account<'a>(
		&'a self,
		key: &'a AccountKey,
		patch: AccountPatch,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<UserStoreAccount>>;

	/// Removes an account row together with its sealed tokens.
	fn delete_account<'a>(&'a self, key: &'a AccountKey) -> StoreFuture<'a, bool>;

	/// Fetches a cached price point.
	fn fetch_price_point<'a>(&'a self, key: &'a PriceKey) -> StoreFuture<'a, Option<PricePoint>>;

	/// Folds an observation into the price point under the row lock.
	fn record_price_observation<'a>(
		&'a self,
		key: &'a PriceKey,
		observation: PriceObservation,
	) -> StoreFuture<'a, PricePoint>;

	/// Inserts or replaces a wishlist entry.
	fn upsert_wishlist_entry(&self, entry: WishlistEntry) -> StoreFuture<'_, ()>;

	/// Removes a wishlist entry.
	fn remove_wishlist_entry<'a>(&'a self, key: &'a WishlistKey) -> StoreFuture<'a, bool>;

	/// Lists a user's wishlist, highest priority first.
	fn list_wishlist<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<WishlistEntry>>;

	/// Row counts per table.
	fn counts(&self) -> StoreFuture<'_, StoreCounts>;
}

/// What [`SyncStore::upsert_library_entry`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibraryUpsert {
	/// A new entry was inserted.
	Created,
	/// Playtime or last-played changed.
	Updated,
	/// The stored entry already matched.
	Unchanged,
}

/// Error type produced by [`SyncStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_engine_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let engine_error: Error = store_error.clone().into();

		assert!(matches!(engine_error, Error::Storage(_)));
		assert!(engine_error.to_string().contains("database unreachable"));

		let source = StdError::source(&engine_error)
			.expect("Engine error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn library_upsert_outcome_can_be_serialized() {
		let payload = serde_json::to_string(&LibraryUpsert::Unchanged)
			.expect("LibraryUpsert should serialize to JSON.");

		assert_eq!(payload, "\"Unchanged\"");
	}
}
