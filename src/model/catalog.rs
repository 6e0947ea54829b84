//! Canonical catalog games and the storefront listings that point at them.

// self
use crate::{
	_prelude::*,
	auth::{ExternalGameId, ProviderKind},
	provider::{PriceQuote, ProviderGameRecord},
};

/// Internal catalog identifier assigned by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogGameId(pub u64);
impl Display for CatalogGameId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}", self.0)
	}
}

/// Provider-agnostic game entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogGame {
	/// Store-assigned identifier.
	pub id: CatalogGameId,
	/// Display name.
	pub name: String,
	/// Short description.
	pub description: Option<String>,
	/// Release date as first reported.
	pub release_date: Option<String>,
	/// Developer name.
	pub developer: Option<String>,
	/// Publisher name.
	pub publisher: Option<String>,
	/// Cover art.
	pub cover_url: Option<Url>,
	/// Small icon.
	pub icon_url: Option<Url>,
	/// Genres.
	pub genres: Vec<String>,
	/// Tags.
	pub tags: Vec<String>,
	/// Platforms.
	pub platforms: Vec<String>,
	/// When the catalog entry was created.
	pub created_at: OffsetDateTime,
}
impl CatalogGame {
	/// Seeds a catalog entry from the first listing that referenced it.
	pub fn from_record(
		id: CatalogGameId,
		record: &ProviderGameRecord,
		now: OffsetDateTime,
	) -> Self {
		Self {
			id,
			name: record.name.trim().to_owned(),
			description: record.description.clone(),
			release_date: record.release_date.clone(),
			developer: record.developer.clone(),
			publisher: record.publisher.clone(),
			cover_url: record.cover_url.clone(),
			icon_url: record.icon_url.clone(),
			genres: record.genres.clone(),
			tags: record.tags.clone(),
			platforms: record.platforms.clone(),
			created_at: now,
		}
	}
}

/// Sole reconciliation identity: one storefront's native id for one game.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListingKey {
	/// Storefront.
	pub provider: ProviderKind,
	/// Storefront-native identifier.
	pub external_id: ExternalGameId,
}
impl ListingKey {
	/// Builds a key.
	pub fn new(provider: ProviderKind, external_id: ExternalGameId) -> Self {
		Self { provider, external_id }
	}
}
impl Display for ListingKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}", self.provider, self.external_id)
	}
}

/// A storefront's view of one catalog game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderListing {
	/// Identity.
	pub key: ListingKey,
	/// Catalog game this listing belongs to; never changes once set.
	pub game_id: CatalogGameId,
	/// Storefront product page.
	pub store_url: Option<Url>,
	/// Last observed price (regular, discounted, currency).
	pub price: Option<PriceQuote>,
	/// Whether the storefront currently sells the game.
	pub available: bool,
	/// Last time a sync or price refresh touched this listing.
	pub last_checked_at: OffsetDateTime,
}

/// Mutable listing fields applied by [`crate::store::SyncStore::reconcile_listing`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingUpdate {
	/// Storefront product page; `None` keeps the stored value.
	pub store_url: Option<Url>,
	/// Observed price; `None` keeps the stored value.
	pub price: Option<PriceQuote>,
	/// Availability.
	pub available: bool,
	/// Observation time.
	pub checked_at: OffsetDateTime,
}
impl ListingUpdate {
	/// Derives the mutable fields from a provider record.
	pub fn from_record(record: &ProviderGameRecord, checked_at: OffsetDateTime) -> Self {
		Self {
			store_url: record.store_url.clone(),
			price: record.price.clone(),
			available: true,
			checked_at,
		}
	}

	/// Applies the update onto an existing listing.
	pub fn apply(&self, listing: &mut ProviderListing) {
		if let Some(url) = &self.store_url {
			listing.store_url = Some(url.clone());
		}
		if let Some(price) = &self.price {
			listing.price = Some(price.clone());
		}

		listing.available = self.available;
		listing.last_checked_at = self.checked_at;
	}
}

/// Outcome of reconciling one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciledListing {
	/// Listing after the upsert.
	pub listing: ProviderListing,
	/// True when the catalog game was created by this call.
	pub created: bool,
}
