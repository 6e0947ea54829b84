//! Deterministic in-process provider for tests, demos, and local development.
//!
//! [`ScriptedProvider`] honors the same contract as the HTTP clients: every call takes a
//! permit from its own [`RateLimiter`], respects cancellation, and reports failures with the
//! engine's error taxonomy. Responses are scripted up front and can be changed while the
//! provider is shared.

// std
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ExternalGameId, ProviderKind, RegionCode, TokenGrant, TokenSecret},
	error::{ConfigError, TransientError},
	ext::{Cancellation, RateLimitSettings, RateLimiter},
	provider::{
		Capability, OwnedGames, PriceQuote, ProviderFuture, ProviderGameRecord,
		ProviderOperation, StoreProvider,
	},
};

/// Failure a scripted call should produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedFailure {
	/// Temporary upstream outage (HTTP 503).
	Transient,
	/// Stored credentials no longer accepted.
	AuthExpired,
	/// Provider demands extra consent.
	ConsentRequired(Url),
	/// Authorization code refused.
	ExchangeRejected,
}
impl ScriptedFailure {
	fn into_error(self, operation: ProviderOperation) -> Error {
		match self {
			ScriptedFailure::Transient => TransientError::Upstream {
				message: format!("scripted {operation} outage"),
				status: Some(503),
				retry_after: None,
			}
			.into(),
			ScriptedFailure::AuthExpired =>
				Error::AuthExpired { reason: "scripted token revocation".into() },
			ScriptedFailure::ConsentRequired(continuation_url) =>
				Error::ConsentRequired { continuation_url },
			ScriptedFailure::ExchangeRejected => Error::AuthExchangeFailed {
				status: Some(400),
				reason: "scripted code rejection".into(),
			},
		}
	}
}

/// Snapshot of how often each operation reached the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScriptedCallCounts {
	/// Code exchanges.
	pub exchange: u64,
	/// Refresh grants.
	pub refresh: u64,
	/// Profile lookups.
	pub profile: u64,
	/// Owned-games listings.
	pub owned_games: u64,
	/// Searches.
	pub search: u64,
	/// Price lookups.
	pub price: u64,
}

#[derive(Debug, Default)]
struct CallCounters {
	exchange: AtomicU64,
	refresh: AtomicU64,
	profile: AtomicU64,
	owned_games: AtomicU64,
	search: AtomicU64,
	price: AtomicU64,
}
impl CallCounters {
	fn bump(&self, operation: ProviderOperation) {
		let counter = match operation {
			ProviderOperation::ExchangeCode => &self.exchange,
			ProviderOperation::RefreshToken => &self.refresh,
			ProviderOperation::AccountProfile => &self.profile,
			ProviderOperation::OwnedGames => &self.owned_games,
			ProviderOperation::Search => &self.search,
			ProviderOperation::Price => &self.price,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}

	fn snapshot(&self) -> ScriptedCallCounts {
		ScriptedCallCounts {
			exchange: self.exchange.load(Ordering::Relaxed),
			refresh: self.refresh.load(Ordering::Relaxed),
			profile: self.profile.load(Ordering::Relaxed),
			owned_games: self.owned_games.load(Ordering::Relaxed),
			search: self.search.load(Ordering::Relaxed),
			price: self.price.load(Ordering::Relaxed),
		}
	}
}

#[derive(Debug)]
struct Script {
	exchange: std::result::Result<TokenGrant, ScriptedFailure>,
	refresh: Option<std::result::Result<TokenGrant, ScriptedFailure>>,
	profile: AccountProfile,
	required_access_token: Option<String>,
	owned_games: Vec<ProviderGameRecord>,
	owned_games_interrupt: Option<(usize, ScriptedFailure)>,
	owned_games_failures: VecDeque<ScriptedFailure>,
	search: Option<Vec<ProviderGameRecord>>,
	search_failures: VecDeque<ScriptedFailure>,
	prices_supported: bool,
	prices: HashMap<String, PriceQuote>,
	price_failures: VecDeque<ScriptedFailure>,
}
impl Default for Script {
	fn default() -> Self {
		let expires_at = OffsetDateTime::now_utc() + Duration::hours(1);

		Self {
			exchange: Ok(TokenGrant::new("scripted-access", expires_at)
				.with_refresh_token("scripted-refresh")),
			refresh: None,
			profile: AccountProfile {
				provider_user_id: "scripted-user".into(),
				display_name: "Scripted Player".into(),
				avatar_url: None,
			},
			required_access_token: None,
			owned_games: Vec::new(),
			owned_games_interrupt: None,
			owned_games_failures: VecDeque::new(),
			search: None,
			search_failures: VecDeque::new(),
			prices_supported: true,
			prices: HashMap::new(),
			price_failures: VecDeque::new(),
		}
	}
}

/// Scripted storefront.
#[derive(Debug)]
pub struct ScriptedProvider {
	kind: ProviderKind,
	script: Mutex<Script>,
	calls: CallCounters,
	limiter: RateLimiter,
	latency: Option<Duration>,
}
impl ScriptedProvider {
	/// Creates a scripted provider posing as `kind`, with that provider's default budget.
	pub fn new(kind: ProviderKind) -> Self {
		Self {
			kind,
			script: Mutex::new(Script::default()),
			calls: CallCounters::default(),
			limiter: RateLimiter::new(kind, RateLimitSettings::default_for(kind)),
			latency: None,
		}
	}

	/// Replaces the rate-limit budget.
	pub fn with_rate_limit(mut self, settings: RateLimitSettings) -> Self {
		self.limiter = RateLimiter::new(self.kind, settings);

		self
	}

	/// Delays every call by `latency` (after the permit is granted).
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);

		self
	}

	/// Bucket guarding this provider.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// How often each operation was attempted.
	pub fn calls(&self) -> ScriptedCallCounts {
		self.calls.snapshot()
	}

	/// Sets the grant returned by code exchanges.
	pub fn set_exchange(&self, grant: TokenGrant) {
		self.script.lock().exchange = Ok(grant);
	}

	/// Makes code exchanges fail.
	pub fn fail_exchange(&self, failure: ScriptedFailure) {
		self.script.lock().exchange = Err(failure);
	}

	/// Sets the refresh outcome; `None` makes refresh unsupported.
	pub fn set_refresh(&self, grant: Option<TokenGrant>) {
		self.script.lock().refresh = grant.map(Ok);
	}

	/// Makes refresh grants fail.
	pub fn fail_refresh(&self, failure: ScriptedFailure) {
		self.script.lock().refresh = Some(Err(failure));
	}

	/// Sets the linked account's identity.
	pub fn set_profile(&self, profile: AccountProfile) {
		self.script.lock().profile = profile;
	}

	/// Rejects API calls whose access token differs from `token` as expired.
	pub fn require_access_token(&self, token: impl Into<String>) {
		self.script.lock().required_access_token = Some(token.into());
	}

	/// Sets the owned-games listing.
	pub fn set_owned_games(&self, records: Vec<ProviderGameRecord>) {
		self.script.lock().owned_games = records;
	}

	/// Cuts every listing short after `delivered` records with `failure`.
	pub fn interrupt_owned_games_after(&self, delivered: usize, failure: ScriptedFailure) {
		self.script.lock().owned_games_interrupt = Some((delivered, failure));
	}

	/// Fails the next owned-games listing outright.
	pub fn fail_next_owned_games(&self, failure: ScriptedFailure) {
		self.script.lock().owned_games_failures.push_back(failure);
	}

	/// Sets search results; searches are unsupported until this is called.
	pub fn set_search(&self, records: Vec<ProviderGameRecord>) {
		self.script.lock().search = Some(records);
	}

	/// Fails the next search.
	pub fn fail_next_search(&self, failure: ScriptedFailure) {
		self.script.lock().search_failures.push_back(failure);
	}

	/// Sets the price for one game; games without a price are reported as not for sale.
	pub fn set_price(&self, external_id: impl Into<String>, quote: PriceQuote) {
		self.script.lock().prices.insert(external_id.into(), quote);
	}

	/// Removes the price for one game.
	pub fn clear_price(&self, external_id: &str) {
		self.script.lock().prices.remove(external_id);
	}

	/// Makes price lookups unsupported.
	pub fn disable_prices(&self) {
		self.script.lock().prices_supported = false;
	}

	/// Fails the next price lookup.
	pub fn fail_next_price(&self, failure: ScriptedFailure) {
		self.script.lock().price_failures.push_back(failure);
	}

	async fn enter(&self, operation: ProviderOperation, cancel: &Cancellation) -> Result<()> {
		self.calls.bump(operation);
		self.limiter.acquire(operation.as_str(), cancel).await?;

		if let Some(latency) = self.latency {
			cancel
				.run(async {
					tokio::time::sleep(latency.unsigned_abs()).await;

					Ok(())
				})
				.await?;
		}

		cancel.check()
	}

	fn authorize(&self, access_token: &TokenSecret) -> Result<()> {
		match &self.script.lock().required_access_token {
			Some(required) if required != access_token.expose() =>
				Err(ScriptedFailure::AuthExpired.into_error(ProviderOperation::OwnedGames)),
			_ => Ok(()),
		}
	}
}
impl StoreProvider for ScriptedProvider {
	fn kind(&self) -> ProviderKind {
		self.kind
	}

	fn authorization_url(&self, state: &str) -> Result<Url> {
		let mut url = Url::parse("https://login.scripted.invalid/authorize")
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		url.query_pairs_mut()
			.append_pair("provider", self.kind.as_str())
			.append_pair("state", state);

		Ok(url)
	}

	fn exchange_code<'a>(
		&'a self,
		_code: &'a str,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, TokenGrant> {
		Box::pin(async move {
			let operation = ProviderOperation::ExchangeCode;

			self.enter(operation, cancel).await?;
			self.script.lock().exchange.clone().map_err(|failure| failure.into_error(operation))
		})
	}

	fn refresh_access_token<'a>(
		&'a self,
		_refresh_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<TokenGrant>> {
		Box::pin(async move {
			let operation = ProviderOperation::RefreshToken;

			self.enter(operation, cancel).await?;

			let refresh = self.script.lock().refresh.clone();

			match refresh {
				None => Ok(Capability::Unsupported),
				Some(Ok(grant)) => Ok(Capability::Supported(grant)),
				Some(Err(failure)) => Err(failure.into_error(operation)),
			}
		})
	}

	fn fetch_account_profile<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, AccountProfile> {
		Box::pin(async move {
			self.enter(ProviderOperation::AccountProfile, cancel).await?;
			self.authorize(access_token)?;

			Ok(self.script.lock().profile.clone())
		})
	}

	fn fetch_owned_games<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, OwnedGames> {
		Box::pin(async move {
			let operation = ProviderOperation::OwnedGames;

			self.enter(operation, cancel).await?;
			self.authorize(access_token)?;

			let mut script = self.script.lock();

			if let Some(failure) = script.owned_games_failures.pop_front() {
				return Err(failure.into_error(operation));
			}

			let mut records = script.owned_games.clone();

			match script.owned_games_interrupt.clone() {
				Some((delivered, failure)) if delivered < records.len() => {
					records.truncate(delivered);

					Ok(OwnedGames::partial(records, failure.into_error(operation)))
				},
				_ => Ok(OwnedGames::complete(records)),
			}
		})
	}

	fn search_games<'a>(
		&'a self,
		query: &'a str,
		limit: usize,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Vec<ProviderGameRecord>>> {
		Box::pin(async move {
			let operation = ProviderOperation::Search;

			self.enter(operation, cancel).await?;

			let needle = query.to_lowercase();
			let mut script = self.script.lock();

			if let Some(failure) = script.search_failures.pop_front() {
				return Err(failure.into_error(operation));
			}

			let Some(records) = &script.search else {
				return Ok(Capability::Unsupported);
			};
			let hits = records
				.iter()
				.filter(|record| record.name.to_lowercase().contains(&needle))
				.take(limit)
				.cloned()
				.collect();

			Ok(Capability::Supported(hits))
		})
	}

	fn fetch_game_price<'a>(
		&'a self,
		external_id: &'a ExternalGameId,
		_region: &'a RegionCode,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Option<PriceQuote>>> {
		Box::pin(async move {
			let operation = ProviderOperation::Price;

			if !self.script.lock().prices_supported {
				return Ok(Capability::Unsupported);
			}

			self.enter(operation, cancel).await?;

			let mut script = self.script.lock();

			if let Some(failure) = script.price_failures.pop_front() {
				return Err(failure.into_error(operation));
			}

			Ok(Capability::Supported(script.prices.get(external_id.as_ref()).cloned()))
		})
	}
}
