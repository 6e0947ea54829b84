// crates.io
use time::{Duration, OffsetDateTime, macros};
// self
use storefront_sync::{
	auth::{AccountProfile, ExternalGameId, ProviderKind, RegionCode, UserId},
	model::{
		AccountKey, AccountPatch, CatalogGameId, LibraryEntryUpdate, LibraryKey, ListingKey,
		ListingUpdate, PriceKey, PriceObservation, UserLibraryEntry, UserStoreAccount,
		WishlistEntry, WishlistKey,
	},
	provider::{PriceQuote, ProviderGameRecord},
	store::{LibraryUpsert, MemoryStore, SyncStore},
	vault::SealedSecret,
};

const NOW: OffsetDateTime = macros::datetime!(2026-02-10 12:00 UTC);

fn user(raw: &str) -> UserId {
	UserId::new(raw).expect("User fixture should be valid.")
}

fn listing_key(provider: ProviderKind, raw: &str) -> ListingKey {
	ListingKey::new(provider, ExternalGameId::new(raw).expect("Game fixture should be valid."))
}

fn update(price: Option<PriceQuote>, checked_at: OffsetDateTime) -> ListingUpdate {
	ListingUpdate { store_url: None, available: true, price, checked_at }
}

async fn seed_game(store: &MemoryStore, provider: ProviderKind, raw: &str) -> CatalogGameId {
	let record = ProviderGameRecord::new(raw, format!("Game {raw}"));

	store
		.reconcile_listing(&listing_key(provider, raw), &record, update(None, NOW))
		.await
		.expect("Reconciling the fixture should succeed.")
		.listing
		.game_id
}

#[tokio::test]
async fn reconcile_reuses_the_listing_and_keeps_unset_fields() {
	let store = MemoryStore::default();
	let key = listing_key(ProviderKind::Steam, "620");
	let record = ProviderGameRecord::new("620", "Portal 2");
	let first = store
		.reconcile_listing(&key, &record, update(Some(PriceQuote::flat("USD", 999)), NOW))
		.await
		.expect("First reconcile should succeed.");
	let later = NOW + Duration::hours(1);
	let second = store
		.reconcile_listing(&key, &record, update(None, later))
		.await
		.expect("Second reconcile should succeed.");

	assert!(first.created);
	assert!(!second.created);
	assert_eq!(second.listing.game_id, first.listing.game_id);
	assert_eq!(second.listing.price, first.listing.price);
	assert_eq!(second.listing.last_checked_at, later);

	let game = store
		.fetch_catalog_game(first.listing.game_id)
		.await
		.expect("Catalog lookup should succeed.")
		.expect("Catalog game should exist.");

	assert_eq!(game.name, "Portal 2");
	assert_eq!(game.created_at, NOW);
}

#[tokio::test]
async fn library_upserts_report_what_changed() {
	let store = MemoryStore::default();
	let game_id = seed_game(&store, ProviderKind::Gog, "1").await;
	let key = LibraryKey::new(
		user("collector"),
		ProviderKind::Gog,
		ExternalGameId::new("1").expect("Game fixture should be valid."),
	);
	let record = ProviderGameRecord::new("1", "Gwent").with_playtime_minutes(10);
	let entry = UserLibraryEntry::imported(key.clone(), game_id, &record, NOW);

	assert_eq!(
		store.upsert_library_entry(entry.clone()).await.expect("Insert should succeed."),
		LibraryUpsert::Created
	);
	assert_eq!(
		store.upsert_library_entry(entry).await.expect("Upsert should succeed."),
		LibraryUpsert::Unchanged
	);

	let edit = LibraryEntryUpdate::default().with_hidden(true).with_notes(Some("100%".into()));

	store
		.update_library_entry(&key, &edit, NOW)
		.await
		.expect("Edit should succeed.")
		.expect("Entry should exist.");

	let played = ProviderGameRecord::new("1", "Gwent").with_playtime_minutes(25);
	let later = NOW + Duration::days(1);
	let incoming = UserLibraryEntry::imported(key.clone(), game_id, &played, later);

	assert_eq!(
		store.upsert_library_entry(incoming).await.expect("Upsert should succeed."),
		LibraryUpsert::Updated
	);

	let stored = store
		.fetch_library_entry(&key)
		.await
		.expect("Lookup should succeed.")
		.expect("Entry should exist.");

	assert_eq!(stored.playtime_minutes, 25);
	assert!(stored.hidden);
	assert_eq!(stored.notes.as_deref(), Some("100%"));
	assert_eq!(stored.created_at, NOW);
	assert_eq!(stored.updated_at, later);
}

#[tokio::test]
async fn account_patches_touch_only_their_field() {
	let store = MemoryStore::default();
	let key = AccountKey::new(user("linker"), ProviderKind::Epic);
	let profile = AccountProfile {
		provider_user_id: "epic-1".into(),
		display_name: "Player".into(),
		avatar_url: None,
	};
	let account = UserStoreAccount::linked(
		key.clone(),
		profile,
		SealedSecret::from_bytes(vec![1, 2, 3]),
		None,
		Some(NOW + Duration::hours(1)),
		NOW,
	);

	store.save_account(account.clone()).await.expect("Saving should succeed.");

	let later = NOW + Duration::minutes(5);
	let patched = store
		.patch_account(&key, AccountPatch::Synced { started_at: NOW }, later)
		.await
		.expect("Patch should succeed.")
		.expect("Account should exist.");

	assert_eq!(patched.last_synced_at, Some(NOW));
	assert_eq!(patched.access_token, account.access_token);
	assert_eq!(patched.updated_at, later);

	let disconnected = store
		.patch_account(&key, AccountPatch::Connected(false), later)
		.await
		.expect("Patch should succeed.")
		.expect("Account should exist.");

	assert!(!disconnected.connected);
	assert_eq!(disconnected.last_synced_at, Some(NOW));
	assert!(store.delete_account(&key).await.expect("Delete should succeed."));
	assert!(
		store
			.patch_account(&key, AccountPatch::AutoImport(false), later)
			.await
			.expect("Patch should succeed.")
			.is_none()
	);
}

#[tokio::test]
async fn price_points_keep_the_lowest_observation() {
	let store = MemoryStore::default();
	let key = PriceKey::new(
		ProviderKind::Steam,
		ExternalGameId::new("620").expect("Game fixture should be valid."),
		RegionCode::default(),
	);

	for (offset, amount) in [(0, 1_999), (1, 499), (2, 2_999)] {
		let quote = PriceQuote::flat("USD", amount);
		let observation = PriceObservation::new(Some(quote), NOW + Duration::hours(offset));

		store.record_price_observation(&key, observation).await.expect("Recording should succeed.");
	}

	let point = store
		.fetch_price_point(&key)
		.await
		.expect("Lookup should succeed.")
		.expect("Point should exist.");

	assert_eq!(point.current.map(|quote| quote.final_minor), Some(2_999));
	assert_eq!(point.lowest_final_minor, Some(499));
	assert_eq!(point.lowest_seen_at, Some(NOW + Duration::hours(1)));
	assert_eq!(point.last_fetched_at, NOW + Duration::hours(2));
}

#[tokio::test]
async fn wishlists_are_per_user_and_ordered_by_priority() {
	let store = MemoryStore::default();
	let first = seed_game(&store, ProviderKind::Gog, "1").await;
	let second = seed_game(&store, ProviderKind::Gog, "2").await;
	let alice = user("alice");

	store
		.upsert_wishlist_entry(WishlistEntry::new(WishlistKey::new(alice.clone(), first), NOW))
		.await
		.expect("Insert should succeed.");
	store
		.upsert_wishlist_entry(
			WishlistEntry::new(WishlistKey::new(alice.clone(), second), NOW).with_priority(5),
		)
		.await
		.expect("Insert should succeed.");
	store
		.upsert_wishlist_entry(WishlistEntry::new(WishlistKey::new(user("bob"), first), NOW))
		.await
		.expect("Insert should succeed.");

	let games: Vec<_> = store
		.list_wishlist(&alice)
		.await
		.expect("Listing should succeed.")
		.into_iter()
		.map(|entry| entry.key.game_id)
		.collect();

	assert_eq!(games, vec![second, first]);
	assert!(
		store
			.remove_wishlist_entry(&WishlistKey::new(alice.clone(), second))
			.await
			.expect("Removal should succeed.")
	);
	assert_eq!(store.counts().await.expect("Counting should succeed.").wishlist_entries, 2);
}
