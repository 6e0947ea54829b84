//! Library sync orchestration with an in-flight guard, one refresh retry, and partial success.
//!
//! A run walks `Fetching → Reconciling → Persisting → Done`, or lands in `Failed` when an
//! account-level problem (revoked credentials, transport failure, cancellation) stops it.
//! Per-game failures never abort a run; they are collected into the [`SyncReport`]. Rows
//! written before a failure or cancellation stay in place.

mod metrics;

pub use metrics::SyncMetrics;

// std
use std::panic;
// crates.io
use tokio::task::{JoinHandle, JoinSet};
// self
use crate::{
	_prelude::*,
	auth::{ExternalGameId, ProviderKind, TokenSecret, UserId},
	ext::Cancellation,
	flows::{SyncEngine, SyncPhase, SyncRun},
	model::{
		AccountKey, AccountPatch, LibraryEntryUpdate, LibraryKey, PriceKey, PriceObservation,
		ReconciledListing, UserLibraryEntry, UserStoreAccount,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{Capability, OwnedGames, ProviderGameRecord, StoreProvider},
};

/// Result of one sync trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
	/// The run finished; the report may still carry per-item errors.
	Completed(SyncReport),
	/// Another run already holds this `(user, provider)` pair; nothing was done.
	AlreadySyncing,
}
impl SyncOutcome {
	/// Report of a completed run.
	pub fn report(&self) -> Option<&SyncReport> {
		match self {
			SyncOutcome::Completed(report) => Some(report),
			SyncOutcome::AlreadySyncing => None,
		}
	}
}

/// Aggregate result of a completed run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
	/// Storefront that was synced.
	pub provider: ProviderKind,
	/// Records delivered by the storefront.
	pub total: usize,
	/// Records that ended up in the user's library.
	pub synced: usize,
	/// Catalog games created by this run.
	pub created_games: usize,
	/// Records that failed, in provider order.
	pub item_errors: Vec<SyncItemError>,
	/// Why the owned-games listing stopped early, if it did.
	pub interrupted: Option<String>,
	/// Run start; also recorded as the account's last sync time.
	pub started_at: OffsetDateTime,
}
impl SyncReport {
	fn new(provider: ProviderKind, total: usize, started_at: OffsetDateTime) -> Self {
		Self {
			provider,
			total,
			synced: 0,
			created_games: 0,
			item_errors: Vec::new(),
			interrupted: None,
			started_at,
		}
	}

	/// Returns true when every delivered record was synced from a complete listing.
	pub fn is_complete(&self) -> bool {
		self.item_errors.is_empty() && self.interrupted.is_none()
	}

	/// Human-readable one-liner, e.g. `synced 9 of 10 games, see errors`.
	pub fn summary(&self) -> String {
		let base = format!("synced {} of {} games", self.synced, self.total);

		if self.is_complete() { base } else { format!("{base}, see errors") }
	}

	fn push_error(&mut self, record: &ProviderGameRecord, error: &Error) {
		tracing::warn!(
			provider = %self.provider,
			external_id = %record.external_id,
			error = %error,
			"Library item skipped."
		);

		self.item_errors.push(SyncItemError {
			external_id: record.external_id.clone(),
			reason: error.to_string(),
		});
	}
}

/// One record that could not be synced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemError {
	/// Storefront-native identifier as reported.
	pub external_id: String,
	/// Failure description.
	pub reason: String,
}

/// Handle to a dispatched sync task.
#[derive(Debug)]
pub struct SyncHandle {
	task: JoinHandle<Result<SyncOutcome>>,
	cancel: Cancellation,
}
impl SyncHandle {
	/// Asks the task to stop at its next suspension point.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Returns true once the task has finished.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Waits for the task to finish.
	pub async fn wait(self) -> Result<SyncOutcome> {
		match self.task.await {
			Ok(result) => result,
			Err(e) if e.is_cancelled() => Err(Error::Cancelled),
			Err(e) => panic::resume_unwind(e.into_panic()),
		}
	}
}

impl SyncEngine {
	/// Imports the user's owned games from `provider`.
	pub async fn sync_library(&self, user: &UserId, provider: ProviderKind) -> Result<SyncOutcome> {
		self.sync_library_with(user, provider, &Cancellation::new()).await
	}

	/// Same as [`SyncEngine::sync_library`] with a caller-owned cancellation signal.
	///
	/// A second trigger for a pair that is already running returns
	/// [`SyncOutcome::AlreadySyncing`] immediately. Disconnecting the account fires `cancel`.
	pub async fn sync_library_with(
		&self,
		user: &UserId,
		provider: ProviderKind,
		cancel: &Cancellation,
	) -> Result<SyncOutcome> {
		const KIND: FlowKind = FlowKind::LibrarySync;

		let span = FlowSpan::for_provider(KIND, "sync_library", provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.sync_metrics.record_attempt();

		let key = AccountKey::new(user.clone(), provider);
		let result = span
			.instrument(async {
				let client = self.registry.get(provider)?;
				let Some(run) = self.tracker.try_begin(&key, cancel.clone()) else {
					return Ok(SyncOutcome::AlreadySyncing);
				};
				let report = self.run_library_sync(&run, &key, client.as_ref(), cancel).await?;

				run.finish(SyncPhase::Done);

				Ok(SyncOutcome::Completed(report))
			})
			.await;

		match &result {
			Ok(SyncOutcome::AlreadySyncing) => {
				tracing::debug!(account = %key, "Sync already running; trigger coalesced.");

				self.sync_metrics.record_coalesced();
				obs::record_flow_outcome(KIND, FlowOutcome::Coalesced);
			},
			Ok(SyncOutcome::Completed(report)) if report.is_complete() => {
				tracing::info!(account = %key, summary = %report.summary(), "Library synced.");

				self.sync_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Ok(SyncOutcome::Completed(report)) => {
				tracing::warn!(
					account = %key,
					summary = %report.summary(),
					"Library partially synced."
				);

				self.sync_metrics.record_partial();
				obs::record_flow_outcome(KIND, FlowOutcome::Partial);
			},
			Err(e) => {
				tracing::warn!(account = %key, error = %e, "Library sync failed.");

				self.sync_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	/// Dispatches [`SyncEngine::sync_library`] as a task with its own cancellation signal.
	pub fn spawn_library_sync(&self, user: UserId, provider: ProviderKind) -> SyncHandle {
		let engine = self.clone();
		let cancel = Cancellation::new();
		let task = {
			let cancel = cancel.clone();

			tokio::spawn(async move { engine.sync_library_with(&user, provider, &cancel).await })
		};

		SyncHandle { task, cancel }
	}

	/// Syncs every connected account of `user` concurrently.
	///
	/// Each provider reports its own outcome; one failing storefront never hides the others.
	pub async fn sync_all_libraries(
		&self,
		user: &UserId,
	) -> Result<BTreeMap<ProviderKind, Result<SyncOutcome>>> {
		let accounts = self.store.list_accounts(user).await?;
		let mut tasks = JoinSet::new();

		for account in accounts.into_iter().filter(|account| account.connected) {
			let engine = self.clone();
			let user = user.clone();
			let provider = account.key.provider;

			tasks.spawn(async move { (provider, engine.sync_library(&user, provider).await) });
		}

		let mut outcomes = BTreeMap::new();

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((provider, outcome)) => {
					outcomes.insert(provider, outcome);
				},
				Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
				Err(e) => tracing::warn!(error = %e, "Sync task aborted."),
			}
		}

		Ok(outcomes)
	}

	/// Current state-machine phase for the pair.
	pub fn sync_phase(&self, user: &UserId, provider: ProviderKind) -> SyncPhase {
		self.tracker.phase(&AccountKey::new(user.clone(), provider))
	}

	/// Applies a user edit to a library entry; provider-sourced fields are not editable.
	pub async fn update_library_entry(
		&self,
		user: &UserId,
		provider: ProviderKind,
		external_id: &ExternalGameId,
		update: &LibraryEntryUpdate,
	) -> Result<UserLibraryEntry> {
		update.validate()?;

		let key = LibraryKey::new(user.clone(), provider, external_id.clone());

		self.store.update_library_entry(&key, update, self.now()).await?.ok_or_else(|| {
			Error::NotFound { entity: "library entry", id: format!("{provider}:{external_id}") }
		})
	}

	/// Lists a user's library across storefronts.
	pub async fn list_library(&self, user: &UserId) -> Result<Vec<UserLibraryEntry>> {
		Ok(self.store.list_library(user).await?)
	}

	async fn run_library_sync(
		&self,
		run: &SyncRun,
		key: &AccountKey,
		client: &dyn StoreProvider,
		cancel: &Cancellation,
	) -> Result<SyncReport> {
		let started_at = self.now();
		let account = self.connected_account(key).await?;
		let OwnedGames { records, interrupted } =
			self.fetch_owned_games(key, &account, client, cancel).await?;
		let mut report = SyncReport::new(key.provider, records.len(), started_at);

		if let Some(e) = interrupted {
			tracing::warn!(account = %key, error = %e, "Owned-games listing cut short.");

			report.interrupted = Some(e.to_string());
		}

		run.advance(SyncPhase::Reconciling);

		let now = self.now();
		let mut reconciled = Vec::with_capacity(records.len());

		for record in &records {
			cancel.check()?;

			match self.reconciler().reconcile(key.provider, record, now).await {
				Ok(listing) => {
					if listing.created {
						report.created_games += 1;
					}

					reconciled.push((record, listing));
				},
				Err(e) => report.push_error(record, &e),
			}
		}

		run.advance(SyncPhase::Persisting);

		for (record, listing) in reconciled {
			cancel.check()?;

			match self.persist_library_item(key, record, &listing, now).await {
				Ok(()) => report.synced += 1,
				Err(e) => report.push_error(record, &e),
			}
		}

		self.store.patch_account(key, AccountPatch::Synced { started_at }, self.now()).await?;

		Ok(report)
	}

	async fn persist_library_item(
		&self,
		key: &AccountKey,
		record: &ProviderGameRecord,
		reconciled: &ReconciledListing,
		now: OffsetDateTime,
	) -> Result<()> {
		let external_id = &reconciled.listing.key.external_id;
		let library_key = LibraryKey::new(key.user.clone(), key.provider, external_id.clone());
		let entry =
			UserLibraryEntry::imported(library_key, reconciled.listing.game_id, record, now);

		self.store.upsert_library_entry(entry).await?;

		if let Some(quote) = &record.price {
			let region = self.config.default_region.clone();
			let price_key = PriceKey::new(key.provider, external_id.clone(), region);
			let observation = PriceObservation::new(Some(quote.clone()), now);

			self.store.record_price_observation(&price_key, observation).await?;
		}

		Ok(())
	}

	async fn fetch_owned_games(
		&self,
		key: &AccountKey,
		account: &UserStoreAccount,
		client: &dyn StoreProvider,
		cancel: &Cancellation,
	) -> Result<OwnedGames> {
		let (access_token, refreshed) =
			match self.usable_access_token(key, account, client, cancel).await {
				Ok(usable) => usable,
				Err(e) => return Err(self.account_failure(key, e).await),
			};

		match client.fetch_owned_games(&access_token, cancel).await {
			Err(e @ Error::AuthExpired { .. }) if refreshed =>
				Err(self.account_failure(key, e).await),
			Err(Error::AuthExpired { reason }) => {
				tracing::info!(account = %key, %reason, "Access token rejected; refreshing once.");

				let retried = async {
					let refreshed =
						self.refresh_account_token(key, client, Some(&access_token), cancel).await?;

					client.fetch_owned_games(&refreshed, cancel).await
				};

				match retried.await {
					Ok(listing) => Ok(listing),
					Err(e) => Err(self.account_failure(key, e).await),
				}
			},
			other => other,
		}
	}

	/// Opens the stored access token, refreshing it first when it has expired and a refresh
	/// token is on file; the flag is true once this run has spent its one refresh.
	///
	/// An expired token without a refresh token is still presented; only the storefront can
	/// declare it dead.
	async fn usable_access_token(
		&self,
		key: &AccountKey,
		account: &UserStoreAccount,
		client: &dyn StoreProvider,
		cancel: &Cancellation,
	) -> Result<(TokenSecret, bool)> {
		if account.is_expired_at(self.now()) && account.refresh_token.is_some() {
			Ok((self.refresh_account_token(key, client, None, cancel).await?, true))
		} else {
			Ok((self.vault().open_token(&account.access_token)?, false))
		}
	}

	/// Marks the account disconnected when `error` means the credentials are gone for good.
	async fn account_failure(&self, key: &AccountKey, error: Error) -> Error {
		if error.requires_relink() {
			tracing::warn!(
				account = %key,
				error = %error,
				"Credentials unusable; account disconnected."
			);

			if let Err(e) =
				self.store.patch_account(key, AccountPatch::Connected(false), self.now()).await
			{
				tracing::error!(account = %key, error = %e, "Failed to mark account disconnected.");
			}
		}

		error
	}

	/// Rotates the stored tokens, coalescing concurrent refreshes for the same account.
	///
	/// `rejected` is the access token the storefront just refused; when another task has
	/// already replaced it, the stored token is reused without calling the storefront.
	pub(crate) async fn refresh_account_token(
		&self,
		key: &AccountKey,
		client: &dyn StoreProvider,
		rejected: Option<&TokenSecret>,
		cancel: &Cancellation,
	) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::TokenRefresh;

		let span = FlowSpan::for_provider(KIND, "refresh_account_token", key.provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let _singleflight = self.refresh_guards.lock(key).await;
				let now = self.now();
				let account = self.connected_account(key).await?;
				let current = self.vault().open_token(&account.access_token)?;
				let replaced = rejected.is_none_or(|token| token.expose() != current.expose());

				if !account.is_expired_at(now) && replaced {
					return Ok(current);
				}

				let Some(sealed_refresh) = &account.refresh_token else {
					return Err(Error::AuthExpired { reason: "no refresh token is stored".into() });
				};
				let refresh_token = self.vault().open_token(sealed_refresh)?;
				let grant = match client.refresh_access_token(&refresh_token, cancel).await? {
					Capability::Supported(grant) => grant,
					Capability::Unsupported =>
						return Err(Error::AuthExpired {
							reason: format!("{} does not issue refresh tokens", key.provider),
						}),
				};
				let access_token = self.vault().seal_token(&grant.access_token)?;
				let refresh_token = match &grant.refresh_token {
					Some(rotated) => Some(self.vault().seal_token(rotated)?),
					None => account.refresh_token.clone(),
				};
				let expires_at = grant.expires_at;
				let patch = AccountPatch::Tokens { access_token, refresh_token, expires_at };

				self.store.patch_account(key, patch, now).await?;

				tracing::info!(account = %key, "Access token refreshed.");

				Ok(grant.access_token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn connected_account(&self, key: &AccountKey) -> Result<UserStoreAccount> {
		self.store
			.fetch_account(key)
			.await?
			.filter(|account| account.connected)
			.ok_or(Error::NotConnected { provider: key.provider })
	}
}
