// std
use std::sync::Arc;
// crates.io
use time::{Duration, OffsetDateTime};
// self
use storefront_sync::{
	auth::{ExternalGameId, ProviderKind, RegionCode, TokenGrant, UserId},
	config::EngineConfig,
	error::Error,
	ext::RateLimitSettings,
	flows::{SyncEngine, SyncOutcome, SyncPhase, SyncReport},
	model::{AccountKey, CompletionStatus, LibraryEntryUpdate, ListingKey, PriceKey},
	provider::{PriceQuote, ProviderGameRecord, ScriptedFailure, ScriptedProvider},
	registry::ProviderRegistry,
	store::{MemoryStore, SyncStore},
	vault::CredentialVault,
};

fn user() -> UserId {
	UserId::new("user-1").expect("User fixture should be valid.")
}

fn game_id(raw: &str) -> ExternalGameId {
	ExternalGameId::new(raw).expect("Game fixture should be valid.")
}

fn scripted(kind: ProviderKind) -> ScriptedProvider {
	ScriptedProvider::new(kind).with_rate_limit(RateLimitSettings::new(1_000., 1_000))
}

fn build_engine(providers: Vec<Arc<ScriptedProvider>>) -> (SyncEngine, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let mut registry = ProviderRegistry::new();

	for provider in providers {
		registry.register(provider);
	}

	let vault = CredentialVault::from_key_bytes(&[9; 32]).expect("Vault key should be valid.");
	let engine = SyncEngine::new(registry, store.clone(), vault, EngineConfig::default());

	(engine, store)
}

/// Links the account and waits for the initial import it dispatches.
async fn link(engine: &SyncEngine, provider: ProviderKind) -> SyncReport {
	let mut outcome = engine
		.connect_account(&user(), provider, "auth-code")
		.await
		.expect("Connecting the fixture account should succeed.");
	let handle = outcome.take_initial_sync().expect("Auto import should dispatch a sync.");

	match handle.wait().await.expect("Initial sync should succeed.") {
		SyncOutcome::Completed(report) => report,
		SyncOutcome::AlreadySyncing => panic!("Initial sync cannot be coalesced."),
	}
}

async fn sync(engine: &SyncEngine, provider: ProviderKind) -> SyncReport {
	match engine.sync_library(&user(), provider).await.expect("Sync should succeed.") {
		SyncOutcome::Completed(report) => report,
		SyncOutcome::AlreadySyncing => panic!("No other sync should be running."),
	}
}

#[tokio::test]
async fn resync_updates_prices_without_duplicating_games() {
	let gog = Arc::new(scripted(ProviderKind::Gog));

	gog.set_owned_games(vec![
		ProviderGameRecord::new("10", "Game A").with_price(PriceQuote::flat("USD", 1_999)),
		ProviderGameRecord::new("20", "Game B").with_price(PriceQuote::flat("USD", 4_999)),
	]);

	let (engine, store) = build_engine(vec![gog.clone()]);
	let first = link(&engine, ProviderKind::Gog).await;
	let counts = store.counts().await.expect("Counting rows should succeed.");

	assert_eq!(first.summary(), "synced 2 of 2 games");
	assert_eq!(first.created_games, 2);
	assert_eq!(counts.catalog_games, 2);
	assert_eq!(counts.listings, 2);
	assert_eq!(counts.library_entries, 2);

	let listing_b = store
		.fetch_listing(&ListingKey::new(ProviderKind::Gog, game_id("20")))
		.await
		.expect("Listing lookup should succeed.")
		.expect("Listing 20 should exist.");

	gog.set_owned_games(vec![
		ProviderGameRecord::new("10", "Game A").with_price(PriceQuote::flat("USD", 999)),
	]);

	let second = sync(&engine, ProviderKind::Gog).await;
	let counts = store.counts().await.expect("Counting rows should succeed.");
	let listing_a = store
		.fetch_listing(&ListingKey::new(ProviderKind::Gog, game_id("10")))
		.await
		.expect("Listing lookup should succeed.")
		.expect("Listing 10 should exist.");
	let point = store
		.fetch_price_point(&PriceKey::new(ProviderKind::Gog, game_id("10"), RegionCode::default()))
		.await
		.expect("Price lookup should succeed.")
		.expect("Sync should record a price observation.");

	assert_eq!(second.created_games, 0);
	assert_eq!(counts.catalog_games, 2);
	assert_eq!(listing_a.price.map(|quote| quote.final_minor), Some(999));
	assert_eq!(point.lowest_final_minor, Some(999));
	assert_eq!(
		store
			.fetch_listing(&ListingKey::new(ProviderKind::Gog, game_id("20")))
			.await
			.expect("Listing lookup should succeed."),
		Some(listing_b)
	);
}

#[tokio::test]
async fn syncing_unchanged_data_twice_keeps_row_counts() {
	let steam = Arc::new(scripted(ProviderKind::Steam));

	steam.set_owned_games(vec![
		ProviderGameRecord::new("620", "Portal 2").with_playtime_minutes(90),
		ProviderGameRecord::new("400", "Portal"),
	]);

	let (engine, store) = build_engine(vec![steam]);

	link(&engine, ProviderKind::Steam).await;

	let before = store.counts().await.expect("Counting rows should succeed.");
	let report = sync(&engine, ProviderKind::Steam).await;
	let after = store.counts().await.expect("Counting rows should succeed.");

	assert!(report.is_complete());
	assert_eq!(report.created_games, 0);
	assert_eq!(before, after);
	assert_eq!(engine.sync_phase(&user(), ProviderKind::Steam), SyncPhase::Done);
}

#[tokio::test(start_paused = true)]
async fn concurrent_triggers_run_exactly_one_sync() {
	let gog = Arc::new(scripted(ProviderKind::Gog).with_latency(Duration::seconds(2)));

	gog.set_owned_games(vec![ProviderGameRecord::new("1", "Gwent")]);

	let (engine, store) = build_engine(vec![gog.clone()]);

	link(&engine, ProviderKind::Gog).await;

	let listings_before = gog.calls().owned_games;
	let (user_a, user_b) = (user(), user());
	let (first, second) = tokio::join!(
		engine.sync_library(&user_a, ProviderKind::Gog),
		engine.sync_library(&user_b, ProviderKind::Gog)
	);
	let first = first.expect("First trigger should succeed.");
	let second = second.expect("Second trigger should succeed.");

	assert!(matches!(first, SyncOutcome::Completed(_)));
	assert_eq!(second, SyncOutcome::AlreadySyncing);
	assert_eq!(gog.calls().owned_games - listings_before, 1);
	assert_eq!(engine.sync_metrics.coalesced(), 1);
	assert_eq!(store.counts().await.expect("Counting rows should succeed.").library_entries, 1);
}

#[tokio::test]
async fn revoked_credentials_without_refresh_disconnect_the_account() {
	let steam = Arc::new(scripted(ProviderKind::Steam));

	steam.set_owned_games(vec![ProviderGameRecord::new("620", "Portal 2")]);

	let (engine, _) = build_engine(vec![steam.clone()]);

	link(&engine, ProviderKind::Steam).await;
	steam.require_access_token("rotated-elsewhere");

	let err = engine
		.sync_library(&user(), ProviderKind::Steam)
		.await
		.expect_err("Revoked credentials should fail the sync.");
	let accounts = engine.list_accounts(&user()).await.expect("Listing accounts should succeed.");

	assert!(matches!(err, Error::AuthExpired { .. }));
	assert!(!accounts[0].connected);
	assert_eq!(engine.sync_phase(&user(), ProviderKind::Steam), SyncPhase::Failed);
	assert!(matches!(
		engine.sync_library(&user(), ProviderKind::Steam).await,
		Err(Error::NotConnected { provider: ProviderKind::Steam })
	));
}

#[tokio::test]
async fn rejected_tokens_are_refreshed_once_and_reused() {
	let gog = Arc::new(scripted(ProviderKind::Gog));

	gog.set_owned_games(vec![ProviderGameRecord::new("1", "Gwent")]);

	let (engine, _) = build_engine(vec![gog.clone()]);

	link(&engine, ProviderKind::Gog).await;
	gog.require_access_token("rotated");
	gog.set_refresh(Some(
		TokenGrant::new("rotated", OffsetDateTime::now_utc() + Duration::hours(1))
			.with_refresh_token("refresh-2"),
	));

	let report = sync(&engine, ProviderKind::Gog).await;

	assert!(report.is_complete());
	assert_eq!(gog.calls().refresh, 1);

	sync(&engine, ProviderKind::Gog).await;

	let accounts = engine.list_accounts(&user()).await.expect("Listing accounts should succeed.");

	assert_eq!(gog.calls().refresh, 1);
	assert!(accounts[0].connected);
}

#[tokio::test]
async fn non_expiring_credentials_never_trigger_a_refresh() {
	let steam = Arc::new(scripted(ProviderKind::Steam));

	steam.set_exchange(TokenGrant::non_expiring("76561197960287930"));
	steam.set_owned_games(vec![ProviderGameRecord::new("620", "Portal 2")]);

	let (engine, store) = build_engine(vec![steam.clone()]);

	link(&engine, ProviderKind::Steam).await;

	let engine = engine.with_clock(Arc::new(|| OffsetDateTime::now_utc() + Duration::days(366)));
	let report = sync(&engine, ProviderKind::Steam).await;
	let account = store
		.fetch_account(&AccountKey::new(user(), ProviderKind::Steam))
		.await
		.expect("Account lookup should succeed.")
		.expect("Account should be stored.");

	assert!(report.is_complete());
	assert!(account.connected);
	assert_eq!(account.expires_at, None);
	assert_eq!(steam.calls().refresh, 0);
	assert_eq!(steam.calls().owned_games, 2);
}

#[tokio::test]
async fn expired_tokens_without_a_refresh_token_are_presented_as_is() {
	let epic = Arc::new(scripted(ProviderKind::Epic));

	epic.set_exchange(TokenGrant::new("aging", OffsetDateTime::now_utc() - Duration::hours(1)));
	epic.set_owned_games(vec![ProviderGameRecord::new("fn", "Fortnite")]);

	let (engine, _) = build_engine(vec![epic.clone()]);
	let report = link(&engine, ProviderKind::Epic).await;
	let accounts = engine.list_accounts(&user()).await.expect("Listing accounts should succeed.");

	assert!(report.is_complete());
	assert!(accounts[0].connected);
	assert_eq!(epic.calls().refresh, 0);
}

#[tokio::test]
async fn expired_tokens_are_refreshed_at_most_once_per_sync() {
	let gog = Arc::new(scripted(ProviderKind::Gog));

	gog.set_owned_games(vec![ProviderGameRecord::new("1", "Gwent")]);

	let (engine, _) = build_engine(vec![gog.clone()]);

	link(&engine, ProviderKind::Gog).await;
	gog.set_refresh(Some(
		TokenGrant::new("fresh", OffsetDateTime::now_utc() + Duration::hours(1))
			.with_refresh_token("refresh-2"),
	));
	gog.require_access_token("never-issued");

	let engine = engine.with_clock(Arc::new(|| OffsetDateTime::now_utc() + Duration::hours(2)));
	let listings_before = gog.calls().owned_games;
	let err = engine
		.sync_library(&user(), ProviderKind::Gog)
		.await
		.expect_err("A refreshed token the storefront still rejects should fail the sync.");
	let accounts = engine.list_accounts(&user()).await.expect("Listing accounts should succeed.");

	assert!(matches!(err, Error::AuthExpired { .. }));
	assert_eq!(gog.calls().refresh, 1);
	assert_eq!(gog.calls().owned_games - listings_before, 1);
	assert!(!accounts[0].connected);
}

#[tokio::test]
async fn transient_failures_keep_the_account_connected() {
	let gog = Arc::new(scripted(ProviderKind::Gog));
	let (engine, _) = build_engine(vec![gog.clone()]);

	link(&engine, ProviderKind::Gog).await;
	gog.fail_next_owned_games(ScriptedFailure::Transient);

	let err = engine
		.sync_library(&user(), ProviderKind::Gog)
		.await
		.expect_err("Upstream outage should fail the sync.");
	let accounts = engine.list_accounts(&user()).await.expect("Listing accounts should succeed.");

	assert!(err.is_transient());
	assert!(accounts[0].connected);
	assert_eq!(engine.sync_metrics.failures(), 1);
}

#[tokio::test]
async fn bad_items_and_cut_short_listings_yield_partial_reports() {
	let epic = Arc::new(scripted(ProviderKind::Epic));

	epic.set_owned_games(vec![
		ProviderGameRecord::new("a", "Alan Wake"),
		ProviderGameRecord::new("b", "   "),
		ProviderGameRecord::new("c", "Control"),
	]);

	let (engine, store) = build_engine(vec![epic.clone()]);
	let report = link(&engine, ProviderKind::Epic).await;
	let account = store
		.list_accounts(&user())
		.await
		.expect("Listing accounts should succeed.")
		.pop()
		.expect("Account should exist.");

	assert_eq!(report.summary(), "synced 2 of 3 games, see errors");
	assert_eq!(report.item_errors[0].external_id, "b");
	assert_eq!(account.last_synced_at, Some(report.started_at));

	epic.interrupt_owned_games_after(1, ScriptedFailure::Transient);

	let report = sync(&engine, ProviderKind::Epic).await;

	assert_eq!(report.total, 1);
	assert_eq!(report.synced, 1);
	assert!(report.interrupted.is_some());
	assert!(!report.is_complete());
	assert_eq!(engine.sync_phase(&user(), ProviderKind::Epic), SyncPhase::Done);
}

#[tokio::test]
async fn user_edits_survive_resync() {
	let steam = Arc::new(scripted(ProviderKind::Steam));

	steam.set_owned_games(vec![
		ProviderGameRecord::new("620", "Portal 2").with_playtime_minutes(5),
	]);

	let (engine, _) = build_engine(vec![steam.clone()]);

	link(&engine, ProviderKind::Steam).await;

	let update = LibraryEntryUpdate::default()
		.with_favorite(true)
		.with_completion(CompletionStatus::Completed)
		.with_rating(Some(9));

	engine
		.update_library_entry(&user(), ProviderKind::Steam, &game_id("620"), &update)
		.await
		.expect("Editing an imported entry should succeed.");
	steam.set_owned_games(vec![
		ProviderGameRecord::new("620", "Portal 2").with_playtime_minutes(50),
	]);
	sync(&engine, ProviderKind::Steam).await;

	let library = engine.list_library(&user()).await.expect("Listing library should succeed.");

	assert_eq!(library.len(), 1);
	assert!(library[0].favorite);
	assert_eq!(library[0].completion, CompletionStatus::Completed);
	assert_eq!(library[0].rating, Some(9));
	assert_eq!(library[0].playtime_minutes, 50);

	let out_of_range = LibraryEntryUpdate::default().with_rating(Some(11));

	assert!(matches!(
		engine
			.update_library_entry(&user(), ProviderKind::Steam, &game_id("620"), &out_of_range)
			.await,
		Err(Error::InvalidInput { field: "rating", .. })
	));
	assert!(matches!(
		engine
			.update_library_entry(&user(), ProviderKind::Steam, &game_id("999"), &update)
			.await,
		Err(Error::NotFound { entity: "library entry", .. })
	));
}

#[tokio::test(start_paused = true)]
async fn disconnecting_cancels_the_running_sync_and_keeps_imported_rows() {
	let gog = Arc::new(scripted(ProviderKind::Gog).with_latency(Duration::seconds(5)));

	gog.set_owned_games(vec![ProviderGameRecord::new("1", "Gwent")]);

	let (engine, store) = build_engine(vec![gog]);

	link(&engine, ProviderKind::Gog).await;

	let handle = engine.spawn_library_sync(user(), ProviderKind::Gog);

	while !engine.sync_phase(&user(), ProviderKind::Gog).is_running() {
		tokio::task::yield_now().await;
	}

	let removed = engine
		.disconnect_account(&user(), ProviderKind::Gog)
		.await
		.expect("Disconnect should succeed.");

	assert!(removed);
	assert!(matches!(handle.wait().await, Err(Error::Cancelled)));
	assert_eq!(engine.sync_phase(&user(), ProviderKind::Gog), SyncPhase::Idle);

	let counts = store.counts().await.expect("Counting rows should succeed.");

	assert_eq!(counts.accounts, 0);
	assert_eq!(counts.library_entries, 1);
}

#[tokio::test]
async fn sync_all_reports_every_connected_storefront() {
	let gog = Arc::new(scripted(ProviderKind::Gog));
	let steam = Arc::new(scripted(ProviderKind::Steam));

	gog.set_owned_games(vec![ProviderGameRecord::new("1", "Gwent")]);
	steam.set_owned_games(vec![ProviderGameRecord::new("620", "Portal 2")]);

	let (engine, store) = build_engine(vec![gog.clone(), steam]);

	link(&engine, ProviderKind::Gog).await;
	link(&engine, ProviderKind::Steam).await;
	gog.fail_next_owned_games(ScriptedFailure::Transient);

	let outcomes = engine.sync_all_libraries(&user()).await.expect("Fan-out should succeed.");

	assert_eq!(outcomes.len(), 2);
	assert!(outcomes[&ProviderKind::Gog].as_ref().is_err_and(Error::is_transient));
	assert!(matches!(outcomes[&ProviderKind::Steam], Ok(SyncOutcome::Completed(_))));
	assert_eq!(store.counts().await.expect("Counting rows should succeed.").library_entries, 2);
}
