//! Wishlist entries and discount alerts.

// self
use crate::{
	_prelude::*,
	auth::UserId,
	model::{CatalogGameId, ProviderListing},
};

/// Upsert key for a wishlist entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WishlistKey {
	/// Owning user.
	pub user: UserId,
	/// Wanted game.
	pub game_id: CatalogGameId,
}
impl WishlistKey {
	/// Builds a key.
	pub fn new(user: UserId, game_id: CatalogGameId) -> Self {
		Self { user, game_id }
	}
}

/// A game a user wants, independent of ownership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
	/// Identity.
	pub key: WishlistKey,
	/// Higher sorts first.
	pub priority: i32,
	/// Raise an alert when any listing is discounted.
	pub notify_on_discount: bool,
	/// Raise an alert when any listing drops to or below this final price.
	pub max_price_minor: Option<i64>,
	/// Creation time.
	pub added_at: OffsetDateTime,
}
impl WishlistEntry {
	/// Builds an entry with defaults.
	pub fn new(key: WishlistKey, added_at: OffsetDateTime) -> Self {
		Self { key, priority: 0, notify_on_discount: true, max_price_minor: None, added_at }
	}

	/// Sets the priority.
	pub fn with_priority(mut self, priority: i32) -> Self {
		self.priority = priority;

		self
	}

	/// Sets the discount notification flag.
	pub fn with_notify_on_discount(mut self, notify: bool) -> Self {
		self.notify_on_discount = notify;

		self
	}

	/// Sets the price threshold.
	pub fn with_max_price_minor(mut self, max_price_minor: i64) -> Self {
		self.max_price_minor = Some(max_price_minor);

		self
	}

	/// Decides whether `listing` should raise an alert for this entry.
	pub fn alert_reason(&self, listing: &ProviderListing) -> Option<AlertReason> {
		let price = listing.price.as_ref().filter(|_| listing.available)?;

		if let Some(max) = self.max_price_minor
			&& price.final_minor <= max
		{
			return Some(AlertReason::BelowThreshold { threshold_minor: max });
		}
		if self.notify_on_discount && price.is_discounted() {
			return Some(AlertReason::Discounted { percent: price.discount_percent });
		}

		None
	}
}

/// Why a wishlist alert fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertReason {
	/// The listing is on sale.
	Discounted {
		/// Reported discount.
		percent: u8,
	},
	/// The listing's final price reached the user's threshold.
	BelowThreshold {
		/// Threshold that was met.
		threshold_minor: i64,
	},
}

/// Alert produced by [`crate::flows::SyncEngine::wishlist_price_alerts`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistAlert {
	/// Entry that matched.
	pub entry: WishlistEntry,
	/// Listing that triggered the alert.
	pub listing: ProviderListing,
	/// Trigger.
	pub reason: AlertReason,
}
