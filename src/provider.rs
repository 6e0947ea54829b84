//! Storefront clients behind one uniform contract.
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering HTTPS-only
//! endpoints, client authentication preferences, and provider quirks (scopes, token
//! lifetime, pagination caps). `strategy` maps provider failures into the engine error
//! taxonomy. `transport` is the only path to the network: it takes a rate-limit permit,
//! enforces the call deadline, honors cancellation, and classifies responses.
//! The concrete clients (`steam`, `gog`, `epic`, `scripted`) implement [`StoreProvider`].

pub mod descriptor;
pub mod epic;
pub mod gog;
pub mod scripted;
pub mod steam;
pub mod strategy;
pub mod transport;

pub use descriptor::*;
pub use epic::EpicProvider;
pub use gog::GogProvider;
pub use scripted::*;
pub use steam::SteamProvider;
pub use strategy::*;
pub use transport::ProviderTransport;

// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ExternalGameId, ProviderKind, RegionCode, TokenGrant, TokenSecret},
	ext::Cancellation,
};

/// Boxed future returned by [`StoreProvider`] operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Operations a provider may be asked to perform; used for permits, errors, and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
	/// Authorization-code exchange.
	ExchangeCode,
	/// Refresh-token grant.
	RefreshToken,
	/// Account profile lookup.
	AccountProfile,
	/// Owned-games listing.
	OwnedGames,
	/// Catalog search.
	Search,
	/// Price lookup.
	Price,
}
impl ProviderOperation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderOperation::ExchangeCode => "exchange_code",
			ProviderOperation::RefreshToken => "refresh_token",
			ProviderOperation::AccountProfile => "account_profile",
			ProviderOperation::OwnedGames => "owned_games",
			ProviderOperation::Search => "search",
			ProviderOperation::Price => "price",
		}
	}

	/// Returns true for calls made against the OAuth token endpoint.
	pub const fn is_token_grant(self) -> bool {
		matches!(self, ProviderOperation::ExchangeCode | ProviderOperation::RefreshToken)
	}
}
impl Display for ProviderOperation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of an operation a provider may legitimately not offer.
///
/// `Unsupported` means "cannot ask", which callers must keep distinct from an empty
/// `Supported` result ("asked, nothing found").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capability<T> {
	/// The provider answered.
	Supported(T),
	/// The provider has no API for this operation.
	Unsupported,
}
impl<T> Capability<T> {
	/// Returns true when the provider answered.
	pub fn is_supported(&self) -> bool {
		matches!(self, Capability::Supported(_))
	}

	/// Converts into an [`Option`], dropping the distinction.
	pub fn supported(self) -> Option<T> {
		match self {
			Capability::Supported(value) => Some(value),
			Capability::Unsupported => None,
		}
	}

	/// Converts `Unsupported` into [`Error::Unsupported`].
	pub fn into_result(self, provider: ProviderKind, operation: ProviderOperation) -> Result<T> {
		match self {
			Capability::Supported(value) => Ok(value),
			Capability::Unsupported =>
				Err(Error::Unsupported { provider, operation: operation.as_str() }),
		}
	}
}

/// Price reported by a storefront, in minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
	/// ISO 4217 currency code.
	pub currency: String,
	/// Undiscounted price.
	pub initial_minor: i64,
	/// Price a buyer pays right now.
	pub final_minor: i64,
	/// Discount percentage as reported (0 when not on sale).
	pub discount_percent: u8,
}
impl PriceQuote {
	/// Builds a quote and derives the discount from the two amounts.
	pub fn new(currency: impl Into<String>, initial_minor: i64, final_minor: i64) -> Self {
		let discount_percent = if initial_minor > 0 && final_minor < initial_minor {
			let saved = (initial_minor - final_minor) * 100 / initial_minor;

			u8::try_from(saved).unwrap_or(100)
		} else {
			0
		};

		Self { currency: currency.into(), initial_minor, final_minor, discount_percent }
	}

	/// Builds a quote without a discount.
	pub fn flat(currency: impl Into<String>, amount_minor: i64) -> Self {
		Self::new(currency, amount_minor, amount_minor)
	}

	/// Returns true when the storefront reports a discount.
	pub fn is_discounted(&self) -> bool {
		self.discount_percent > 0 || self.final_minor < self.initial_minor
	}
}

/// One game as a storefront reports it.
///
/// `external_id` stays a raw string here; the catalog reconciler validates it and
/// reports malformed identifiers as per-item conflicts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGameRecord {
	/// Provider-native identifier.
	pub external_id: String,
	/// Title as shown by the storefront.
	pub name: String,
	/// Short description.
	pub description: Option<String>,
	/// Developer name.
	pub developer: Option<String>,
	/// Publisher name.
	pub publisher: Option<String>,
	/// Release date as reported.
	pub release_date: Option<String>,
	/// Cover or capsule art.
	pub cover_url: Option<Url>,
	/// Small icon.
	pub icon_url: Option<Url>,
	/// Storefront product page.
	pub store_url: Option<Url>,
	/// Genres.
	pub genres: Vec<String>,
	/// Tags.
	pub tags: Vec<String>,
	/// Platforms.
	pub platforms: Vec<String>,
	/// Price, when the listing endpoint includes one.
	pub price: Option<PriceQuote>,
	/// Total playtime in minutes (owned-games listings only).
	pub playtime_minutes: Option<u64>,
	/// Last time the user played (owned-games listings only).
	pub last_played_at: Option<OffsetDateTime>,
}
impl ProviderGameRecord {
	/// Creates a record with just identity and title.
	pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> Self {
		Self { external_id: external_id.into(), name: name.into(), ..Default::default() }
	}

	/// Attaches a price.
	pub fn with_price(mut self, price: PriceQuote) -> Self {
		self.price = Some(price);

		self
	}

	/// Attaches playtime.
	pub fn with_playtime_minutes(mut self, minutes: u64) -> Self {
		self.playtime_minutes = Some(minutes);

		self
	}
}

/// Owned-games listing that survives pagination failures.
///
/// `records` holds every page fetched before `interrupted` (if any) stopped the walk.
#[derive(Debug, Default)]
pub struct OwnedGames {
	/// Records in provider order.
	pub records: Vec<ProviderGameRecord>,
	/// Failure that cut the listing short.
	pub interrupted: Option<Error>,
}
impl OwnedGames {
	/// Complete listing.
	pub fn complete(records: Vec<ProviderGameRecord>) -> Self {
		Self { records, interrupted: None }
	}

	/// Listing cut short by `error`.
	pub fn partial(records: Vec<ProviderGameRecord>, error: Error) -> Self {
		Self { records, interrupted: Some(error) }
	}

	/// Returns true when every page was fetched.
	pub fn is_complete(&self) -> bool {
		self.interrupted.is_none()
	}
}

/// Uniform contract every storefront integration implements.
///
/// Every network-bound method takes a permit from the provider's rate limiter before
/// touching the network and aborts promptly when `cancel` fires.
pub trait StoreProvider
where
	Self: Send + Sync,
{
	/// Storefront this client talks to.
	fn kind(&self) -> ProviderKind;

	/// Builds the login URL embedding the caller's anti-forgery `state`. Pure.
	fn authorization_url(&self, state: &str) -> Result<Url>;

	/// Exchanges an authorization code for tokens.
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, TokenGrant>;

	/// Trades a refresh token for a new grant; `Unsupported` when the provider has none.
	fn refresh_access_token<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<TokenGrant>>;

	/// Looks up the linked account's identity.
	fn fetch_account_profile<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, AccountProfile>;

	/// Lists owned games, keeping pages fetched before a failure.
	fn fetch_owned_games<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, OwnedGames>;

	/// Searches the public catalog.
	fn search_games<'a>(
		&'a self,
		query: &'a str,
		limit: usize,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Vec<ProviderGameRecord>>>;

	/// Looks up the current price; `Supported(None)` when the game is not for sale.
	fn fetch_game_price<'a>(
		&'a self,
		external_id: &'a ExternalGameId,
		region: &'a RegionCode,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Option<PriceQuote>>>;
}
