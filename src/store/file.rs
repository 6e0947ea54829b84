//! Simple file-backed [`SyncStore`] for single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
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
	store::{
		LibraryUpsert, StoreCounts, StoreError, StoreFuture, SyncStore, Tables, tables::Snapshot,
	},
};

/// Persists every table to a JSON snapshot after each mutation.
///
/// Sealed tokens are written as base64 ciphertext; the snapshot never holds plaintext.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Tables>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let tables = Tables::from_snapshot(Self::load_snapshot(&path)?);

		Ok(Self { path, inner: Arc::new(RwLock::new(tables)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, tables: &Tables) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(&tables.snapshot()).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn read<'a, T, F>(&'a self, f: F) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
		F: 'a + Send + FnOnce(&Tables) -> T,
	{
		Box::pin(async move { Ok(f(&self.inner.read())) })
	}

	// The write lock is held across the flush so snapshots land in mutation order.
	fn write<'a, T, F>(&'a self, f: F) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
		F: 'a + Send + FnOnce(&mut Tables) -> T,
	{
		Box::pin(async move {
			let mut guard = self.inner.write();
			let output = f(&mut guard);

			self.persist_locked(&guard)?;

			Ok(output)
		})
	}
}
impl SyncStore for FileStore {
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

	fn fetch_price_point<'a>(
		&'a self,
		key: &'a PriceKey,
	) -> StoreFuture<'a, Option<PricePoint>> {
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
