#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use storefront_sync::{
	auth::{ProviderKind, UserId},
	config::{EndpointOverrides, EngineConfig, OAuthClientConfig, SteamConfig},
	error::Error,
	ext::{Cancellation, RateLimitSettings},
	flows::{ConnectOutcome, PriceRequest, PriceSource, SyncEngine, SyncOutcome, SyncReport},
	http::{ReqwestHttpClient, StoreHttpClient},
	model::ListingKey,
	registry::ProviderRegistry,
	reqwest::Client,
	store::{MemoryStore, SyncStore},
	url::{Url, form_urlencoded},
	vault::CredentialVault,
};

const STEAM_ID: &str = "76561197960287930";
const OPENID_LOGIN: &str = "/openid/login";

fn url(raw: &str) -> Url {
	Url::parse(raw).expect("URL fixture should parse.")
}

fn user() -> UserId {
	UserId::new("http-user").expect("User fixture should be valid.")
}

/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
/// `httpmock` during tests.
fn test_http_client() -> Arc<dyn StoreHttpClient> {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	Arc::new(ReqwestHttpClient::with_client(client))
}

/// Query Steam appends to the return URL after a login for `claimed_id`.
fn steam_callback(claimed_id: &str) -> String {
	form_urlencoded::Serializer::new(String::new())
		.append_pair("state", "opaque-state")
		.append_pair("openid.ns", "http://specs.openid.net/auth/2.0")
		.append_pair("openid.mode", "id_res")
		.append_pair("openid.op_endpoint", "https://steamcommunity.com/openid/login")
		.append_pair("openid.claimed_id", claimed_id)
		.append_pair("openid.identity", claimed_id)
		.append_pair("openid.return_to", "https://app.example.com/steam/return?state=opaque-state")
		.append_pair("openid.assoc_handle", "1234567890")
		.append_pair("openid.signed", "signed,op_endpoint,claimed_id,identity")
		.append_pair("openid.sig", "W0u5DRbtHE1GG0ZKXjerUZDUGmc=")
		.finish()
}

fn steam_login() -> String {
	steam_callback(&format!("https://steamcommunity.com/openid/id/{STEAM_ID}"))
}

async fn mock_steam_check<'a>(server: &'a MockServer, is_valid: bool) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(OPENID_LOGIN)
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("openid.mode=check_authentication")
				.body_includes("openid.sig=W0u5DRbtHE1GG0ZKXjerUZDUGmc%3D");
			then.status(200)
				.body(format!("ns:http://specs.openid.net/auth/2.0\nis_valid:{is_valid}\n"));
		})
		.await
}

fn oauth_client() -> OAuthClientConfig {
	OAuthClientConfig {
		client_id: "client-it".into(),
		client_secret: "secret-it".into(),
		redirect_uri: url("https://app.example.com/callback"),
	}
}

/// Points every endpoint of `kinds` at the mock server; token grants go to `/token`.
fn mock_config(server: &MockServer, kinds: &[ProviderKind]) -> EngineConfig {
	let base = url(&server.base_url());
	let overrides = EndpointOverrides {
		authorization: Some(url(&server.url(OPENID_LOGIN))),
		token: Some(url(&server.url("/token"))),
		..EndpointOverrides::all(base)
	};
	let mut config = EngineConfig::default();

	for kind in kinds {
		match kind {
			ProviderKind::Steam =>
				config.providers.steam = Some(SteamConfig {
					api_key: "steam-key".into(),
					redirect_uri: url("https://app.example.com/steam/return"),
				}),
			ProviderKind::Epic => config.providers.epic = Some(oauth_client()),
			ProviderKind::Gog => config.providers.gog = Some(oauth_client()),
			other => panic!("No HTTP client exists for {other}."),
		}

		config.providers.endpoints.insert(*kind, overrides.clone());
		config = config.with_rate_limit(*kind, RateLimitSettings::new(1_000., 1_000));
	}

	config
}

fn build_engine(config: EngineConfig) -> (SyncEngine, Arc<MemoryStore>) {
	let registry = ProviderRegistry::from_config_with_http_client(&config, test_http_client())
		.expect("Registry should build.");
	let store = Arc::new(MemoryStore::default());
	let vault = CredentialVault::from_key_bytes(&[5; 32]).expect("Vault key should be valid.");

	(SyncEngine::new(registry, store.clone(), vault, config), store)
}

async fn initial_sync(mut outcome: ConnectOutcome) -> SyncReport {
	let handle = outcome.take_initial_sync().expect("Auto import should dispatch a sync.");

	match handle.wait().await.expect("Initial sync should succeed.") {
		SyncOutcome::Completed(report) => report,
		SyncOutcome::AlreadySyncing => panic!("Initial sync cannot be coalesced."),
	}
}

#[tokio::test]
async fn steam_links_imports_and_prices_over_the_web_api() {
	let server = MockServer::start_async().await;
	let check = mock_steam_check(&server, true).await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/ISteamUser/GetPlayerSummaries/v2/")
				.query_param("key", "steam-key")
				.query_param("steamids", STEAM_ID);
			then.status(200).json_body(json!({
				"response": {
					"players": [{
						"steamid": STEAM_ID,
						"personaname": "Gabe",
						"avatarfull": "https://avatars.example.com/gabe.jpg"
					}]
				}
			}));
		})
		.await;
	let owned = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/IPlayerService/GetOwnedGames/v1/")
				.query_param("key", "steam-key")
				.query_param("steamid", STEAM_ID)
				.query_param("include_appinfo", "1");
			then.status(200).json_body(json!({
				"response": {
					"game_count": 2,
					"games": [
						{
							"appid": 620,
							"name": "Portal 2",
							"playtime_forever": 1200,
							"img_icon_url": "2e478fc6874d06ae5baf0d147f6f21203291aa02",
							"rtime_last_played": 1700000000
						},
						{ "appid": 400, "name": "Portal", "playtime_forever": 0 }
					]
				}
			}));
		})
		.await;
	let price = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/appdetails")
				.query_param("appids", "620")
				.query_param("cc", "us")
				.query_param("filters", "price_overview");
			then.status(200).json_body(json!({
				"620": {
					"success": true,
					"data": {
						"price_overview": {
							"currency": "USD",
							"initial": 1999,
							"final": 499,
							"discount_percent": 75
						}
					}
				}
			}));
		})
		.await;
	let (engine, store) = build_engine(mock_config(&server, &[ProviderKind::Steam]));
	let outcome = engine
		.connect_account(&user(), ProviderKind::Steam, &steam_login())
		.await
		.expect("Steam login should succeed.");
	let account = outcome.account().cloned().expect("Outcome should carry the account.");
	let report = initial_sync(outcome).await;

	assert_eq!(account.provider_user_id, STEAM_ID);
	assert_eq!(account.display_name, "Gabe");
	assert!(report.is_complete());
	assert_eq!(report.synced, 2);

	let library = engine.list_library(&user()).await.expect("Listing should succeed.");
	let portal_2 = library
		.iter()
		.find(|entry| entry.key.external_id.as_ref() == "620")
		.expect("Portal 2 should be imported.");

	assert_eq!(portal_2.playtime_minutes, 1_200);
	assert!(portal_2.last_played_at.is_some());

	let lookup = engine
		.get_price(PriceRequest::new(ProviderKind::Steam, "620".parse().expect("Id parses.")))
		.await
		.expect("Price lookup should succeed.");
	let listing = store
		.fetch_listing(&ListingKey::new(ProviderKind::Steam, "620".parse().expect("Id parses.")))
		.await
		.expect("Listing lookup should succeed.")
		.expect("Listing should exist.");

	assert_eq!(lookup.source, PriceSource::Fetched);
	assert_eq!(lookup.point.lowest_final_minor, Some(499));
	assert_eq!(listing.price.map(|quote| quote.discount_percent), Some(75));

	check.assert_async().await;
	profile.assert_async().await;
	owned.assert_async().await;
	price.assert_async().await;
}

#[tokio::test]
async fn steam_rejects_bad_api_keys_as_client_misconfiguration() {
	let server = MockServer::start_async().await;
	let check = mock_steam_check(&server, true).await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/ISteamUser/GetPlayerSummaries/v2/");
			then.status(403).body("<html>Forbidden</html>");
		})
		.await;
	let (engine, store) = build_engine(mock_config(&server, &[ProviderKind::Steam]));
	let err = engine
		.connect_account(&user(), ProviderKind::Steam, &steam_login())
		.await
		.expect_err("A rejected key should fail the login.");

	assert!(matches!(err, Error::InvalidClient { .. }));
	assert_eq!(store.counts().await.expect("Counting should succeed.").accounts, 0);

	check.assert_async().await;
	profile.assert_async().await;
}

#[tokio::test]
async fn unconfirmed_steam_assertions_are_refused() {
	let server = MockServer::start_async().await;
	let check = mock_steam_check(&server, false).await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/ISteamUser/GetPlayerSummaries/v2/");
			then.status(200).json_body(json!({ "response": { "players": [] } }));
		})
		.await;
	let (engine, store) = build_engine(mock_config(&server, &[ProviderKind::Steam]));
	let err = engine
		.connect_account(&user(), ProviderKind::Steam, &steam_login())
		.await
		.expect_err("A forged assertion should fail the login.");

	assert!(matches!(err, Error::AuthExchangeFailed { status: Some(200), .. }));
	assert_eq!(store.counts().await.expect("Counting should succeed.").accounts, 0);

	check.assert_async().await;
	profile.assert_hits_async(0).await;
}

#[tokio::test]
async fn bare_steam_ids_are_never_linked() {
	let server = MockServer::start_async().await;
	let check = mock_steam_check(&server, true).await;
	let (engine, store) = build_engine(mock_config(&server, &[ProviderKind::Steam]));

	for code in [
		STEAM_ID.to_owned(),
		format!("https://steamcommunity.com/openid/id/{STEAM_ID}"),
		steam_callback(&format!("https://evil.example.com/openid/id/{STEAM_ID}")),
	] {
		let err = engine
			.connect_account(&user(), ProviderKind::Steam, &code)
			.await
			.expect_err("Codes without a Steam assertion should fail.");

		assert!(matches!(err, Error::AuthExchangeFailed { status: None, .. }));
	}

	assert_eq!(store.counts().await.expect("Counting should succeed.").accounts, 0);

	check.assert_hits_async(0).await;
}

#[tokio::test]
async fn gog_keeps_pages_fetched_before_a_pagination_failure() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("grant_type=authorization_code")
				.body_includes("code=gog-code")
				.body_includes("client_secret=secret-it");
			then.status(200).json_body(json!({
				"access_token": "gog-access",
				"refresh_token": "gog-refresh",
				"token_type": "bearer",
				"expires_in": 3600
			}));
		})
		.await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/userData.json").header("authorization", "Bearer gog-access");
			then.status(200).json_body(json!({
				"userId": "48628349957132247",
				"username": "gogger"
			}));
		})
		.await;
	let first_page = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/account/getFilteredProducts")
				.query_param("page", "1")
				.header("authorization", "Bearer gog-access");
			then.status(200).json_body(json!({
				"totalPages": 2,
				"products": [
					{ "id": 1207658924, "title": "The Witcher 3", "image": "//images.gog.com/w3" },
					{ "id": 1207664663, "title": "Gwent", "url": "/game/gwent" }
				]
			}));
		})
		.await;
	let second_page = server
		.mock_async(|when, then| {
			when.method(GET).path("/account/getFilteredProducts").query_param("page", "2");
			then.status(503).body("maintenance");
		})
		.await;
	let (engine, store) = build_engine(mock_config(&server, &[ProviderKind::Gog]));
	let outcome = engine
		.connect_account(&user(), ProviderKind::Gog, "gog-code")
		.await
		.expect("GOG login should succeed.");

	assert_eq!(outcome.account().map(|account| account.display_name.as_str()), Some("gogger"));

	let report = initial_sync(outcome).await;

	assert_eq!(report.synced, 2);
	assert!(report.interrupted.is_some());
	assert_eq!(store.counts().await.expect("Counting should succeed.").library_entries, 2);

	token.assert_async().await;
	profile.assert_async().await;
	first_page.assert_async().await;
	second_page.assert_async().await;
}

#[tokio::test]
async fn gog_prices_are_parsed_from_amount_strings() {
	let server = MockServer::start_async().await;
	let price = server
		.mock_async(|when, then| {
			when.method(GET).path("/products/1207658924/prices").query_param("countryCode", "US");
			then.status(200).json_body(json!({
				"_embedded": {
					"prices": [{ "basePrice": "3999 USD", "finalPrice": "999 USD" }]
				}
			}));
		})
		.await;
	let (engine, _) = build_engine(mock_config(&server, &[ProviderKind::Gog]));
	let lookup = engine
		.get_price(PriceRequest::new(ProviderKind::Gog, "1207658924".parse().expect("Id parses.")))
		.await
		.expect("Price lookup should succeed.");
	let quote = lookup.point.current.expect("GOG should report a price.");

	assert_eq!((quote.initial_minor, quote.final_minor), (3_999, 999));
	assert_eq!(quote.currency, "USD");
	assert_eq!(quote.discount_percent, 75);

	price.assert_async().await;
}

#[tokio::test]
async fn epic_scope_consent_surfaces_the_continuation_url() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).json_body(json!({
				"errorCode": "errors.com.epicgames.oauth.corrective_action_required",
				"errorMessage": "Corrective action is required to continue.",
				"correctiveAction": "SCOPE_CONSENT",
				"continuationUrl": "https://www.epicgames.com/id/login/consent?continuation=abc"
			}));
		})
		.await;
	let (engine, store) = build_engine(mock_config(&server, &[ProviderKind::Epic]));
	let outcome = engine
		.connect_account(&user(), ProviderKind::Epic, "epic-code")
		.await
		.expect("Consent should not be an error.");

	match outcome {
		ConnectOutcome::ConsentRequired { continuation_url } => assert_eq!(
			continuation_url.as_str(),
			"https://www.epicgames.com/id/login/consent?continuation=abc"
		),
		other => panic!("Expected a consent request, got {other:?}."),
	}

	assert_eq!(store.counts().await.expect("Counting should succeed.").accounts, 0);

	token.assert_async().await;
}

#[tokio::test]
async fn cross_store_search_separates_unsupported_storefronts() -> Result<()> {
	let server = MockServer::start_async().await;
	let search = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/storesearch/").query_param("term", "portal");
			then.status(200).json_body(json!({
				"total": 1,
				"items": [{
					"id": 620,
					"name": "Portal 2",
					"tiny_image": "https://cdn.example.com/620.jpg",
					"price": { "currency": "USD", "initial": 999, "final": 999 }
				}]
			}));
		})
		.await;
	let config = mock_config(&server, &[ProviderKind::Steam, ProviderKind::Epic]);
	let registry = ProviderRegistry::from_config_with_http_client(&config, test_http_client())?;
	let results = registry.search_all("portal", 10, &Cancellation::new()).await;

	assert_eq!(results.total(), 1);
	assert_eq!(results.results[&ProviderKind::Steam][0].name, "Portal 2");
	assert_eq!(results.unsupported, vec![ProviderKind::Epic]);
	assert!(results.failures.is_empty());

	search.assert_async().await;

	Ok(())
}
