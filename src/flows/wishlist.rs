//! Wishlist management and price alerts.

// self
use crate::{
	_prelude::*,
	auth::UserId,
	flows::{PriceRefreshReport, SyncEngine},
	model::{CatalogGameId, PriceKey, WishlistAlert, WishlistEntry, WishlistKey},
};

impl SyncEngine {
	/// Adds a catalog game to the user's wishlist with default alert settings.
	///
	/// Re-adding an entry keeps its settings and original add time.
	pub async fn add_to_wishlist(
		&self,
		user: &UserId,
		game_id: CatalogGameId,
	) -> Result<WishlistEntry> {
		let key = WishlistKey::new(user.clone(), game_id);

		if let Some(existing) =
			self.store.list_wishlist(user).await?.into_iter().find(|entry| entry.key == key)
		{
			return Ok(existing);
		}

		self.save_wishlist_entry(WishlistEntry::new(key, self.now())).await
	}

	/// Inserts or replaces a wishlist entry after checking the game exists.
	pub async fn save_wishlist_entry(&self, entry: WishlistEntry) -> Result<WishlistEntry> {
		let game_id = entry.key.game_id;

		if self.store.fetch_catalog_game(game_id).await?.is_none() {
			return Err(Error::NotFound { entity: "catalog game", id: game_id.to_string() });
		}

		self.store.upsert_wishlist_entry(entry.clone()).await?;

		Ok(entry)
	}

	/// Removes a game from the wishlist, returning false when it was not there.
	pub async fn remove_from_wishlist(
		&self,
		user: &UserId,
		game_id: CatalogGameId,
	) -> Result<bool> {
		let key = WishlistKey::new(user.clone(), game_id);

		Ok(self.store.remove_wishlist_entry(&key).await?)
	}

	/// Lists the wishlist, highest priority first.
	pub async fn list_wishlist(&self, user: &UserId) -> Result<Vec<WishlistEntry>> {
		Ok(self.store.list_wishlist(user).await?)
	}

	/// Entries whose listings are discounted or at or below the entry's price threshold.
	///
	/// Works from stored listing prices; call [`SyncEngine::refresh_wishlist_prices`] first
	/// for up-to-date answers.
	pub async fn wishlist_price_alerts(&self, user: &UserId) -> Result<Vec<WishlistAlert>> {
		let mut alerts = Vec::new();

		for entry in self.store.list_wishlist(user).await? {
			for listing in self.store.list_listings_for_game(entry.key.game_id).await? {
				if let Some(reason) = entry.alert_reason(&listing) {
					alerts.push(WishlistAlert { entry: entry.clone(), listing, reason });
				}
			}
		}

		Ok(alerts)
	}

	/// Refreshes stale default-region prices for every listing on the user's wishlist.
	pub async fn refresh_wishlist_prices(&self, user: &UserId) -> Result<PriceRefreshReport> {
		let region = &self.config.default_region;
		let mut keys = Vec::new();

		for entry in self.store.list_wishlist(user).await? {
			for listing in self.store.list_listings_for_game(entry.key.game_id).await? {
				let key = listing.key;

				keys.push(PriceKey::new(key.provider, key.external_id, region.clone()));
			}
		}

		Ok(self.refresh_stale_prices(keys).await)
	}
}
