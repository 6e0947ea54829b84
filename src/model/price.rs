//! Tracked prices with a monotonic all-time low.

// self
use crate::{
	_prelude::*,
	auth::{ExternalGameId, ProviderKind, RegionCode},
	model::ListingKey,
	provider::PriceQuote,
};

/// Identity of a tracked price.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriceKey {
	/// Storefront.
	pub provider: ProviderKind,
	/// Storefront-native identifier.
	pub external_id: ExternalGameId,
	/// Pricing region.
	pub region: RegionCode,
}
impl PriceKey {
	/// Builds a key.
	pub fn new(provider: ProviderKind, external_id: ExternalGameId, region: RegionCode) -> Self {
		Self { provider, external_id, region }
	}

	/// Listing the price belongs to.
	pub fn listing(&self) -> ListingKey {
		ListingKey::new(self.provider, self.external_id.clone())
	}
}
impl Display for PriceKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}@{}", self.provider, self.external_id, self.region)
	}
}

/// One successful price fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceObservation {
	/// Quote returned by the storefront; `None` when the game is not for sale.
	pub quote: Option<PriceQuote>,
	/// Fetch time.
	pub observed_at: OffsetDateTime,
}
impl PriceObservation {
	/// Builds an observation.
	pub fn new(quote: Option<PriceQuote>, observed_at: OffsetDateTime) -> Self {
		Self { quote, observed_at }
	}
}

/// Cached price for one `(provider, game, region)`.
///
/// `lowest_final_minor` is set on the first priced observation and only ever lowered while the
/// currency stays the same. A quote in another currency restarts the low from that quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
	/// Identity.
	pub key: PriceKey,
	/// Latest quote; `None` when the last fetch found the game unpriced.
	pub current: Option<PriceQuote>,
	/// Last successful fetch; failed fetches leave it alone.
	pub last_fetched_at: OffsetDateTime,
	/// Lowest final price ever observed.
	pub lowest_final_minor: Option<i64>,
	/// Currency of the lowest price.
	pub lowest_currency: Option<String>,
	/// When the lowest price was observed.
	pub lowest_seen_at: Option<OffsetDateTime>,
}
impl PricePoint {
	/// Folds an observation into `existing`, producing the next state of the row.
	///
	/// The current price always follows the observation; the lowest price only moves down.
	pub fn observe(
		existing: Option<PricePoint>,
		key: PriceKey,
		observation: PriceObservation,
	) -> Self {
		let mut point = existing.unwrap_or(PricePoint {
			key,
			current: None,
			last_fetched_at: observation.observed_at,
			lowest_final_minor: None,
			lowest_currency: None,
			lowest_seen_at: None,
		});

		if let Some(quote) = &observation.quote {
			let same_currency = point.lowest_currency.as_deref() == Some(quote.currency.as_str());
			let lower = !same_currency
				|| point.lowest_final_minor.is_none_or(|lowest| quote.final_minor < lowest);

			if lower {
				point.lowest_final_minor = Some(quote.final_minor);
				point.lowest_currency = Some(quote.currency.clone());
				point.lowest_seen_at = Some(observation.observed_at);
			}
		}

		point.current = observation.quote;
		point.last_fetched_at = observation.observed_at;

		point
	}

	/// Returns true while the point is younger than `ttl`.
	pub fn is_fresh(&self, ttl: Duration, now: OffsetDateTime) -> bool {
		now - self.last_fetched_at < ttl
	}

	/// Returns true when the current price is the lowest ever seen.
	pub fn is_all_time_low(&self) -> bool {
		match (&self.current, self.lowest_final_minor, self.lowest_currency.as_deref()) {
			(Some(quote), Some(lowest), Some(currency)) =>
				quote.currency == currency && quote.final_minor <= lowest,
			_ => false,
		}
	}
}
