//! Steam: OpenID 2.0 login, Web API profile and library, storefront search and pricing.
//!
//! Steam has no OAuth token. The "code" handed to [`SteamProvider`] is the OpenID assertion
//! Steam appended to the return URL (the whole callback URL or just its query). The
//! assertion is confirmed with Steam through `check_authentication` before the claimed
//! 64-bit id is stored in place of an access token; that id never expires. API calls
//! authenticate with the engine's Web API key instead.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ExternalGameId, ProviderKind, RegionCode, TokenGrant, TokenSecret},
	config::SteamConfig,
	error::TransientError,
	ext::Cancellation,
	provider::{
		Capability, DefaultProviderStrategy, OwnedGames, PriceQuote, ProviderDescriptor,
		ProviderErrorContext, ProviderErrorKind, ProviderFuture, ProviderGameRecord,
		ProviderOperation, ProviderStrategy, ProviderTransport, StoreProvider,
		transport::endpoint,
	},
};

const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";
const OPENID_IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";
const CLAIMED_ID_PREFIX: &str = "https://steamcommunity.com/openid/id/";
const MEDIA_BASE: &str = "https://media.steampowered.com/steamcommunity/public/images/apps";
const ART_BASE: &str = "https://cdn.cloudflare.steamstatic.com/steam/apps";
const STORE_PAGE_BASE: &str = "https://store.steampowered.com/app";

/// Steam answers a bad or revoked Web API key with 401/403; the user's id never expires.
#[derive(Debug, Default)]
pub struct SteamStrategy;
impl ProviderStrategy for SteamStrategy {
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		match ctx.http_status {
			Some(401 | 403) => ProviderErrorKind::InvalidClient,
			_ => DefaultProviderStrategy.classify_error(ctx),
		}
	}
}

/// Steam storefront client.
#[derive(Debug)]
pub struct SteamProvider {
	descriptor: ProviderDescriptor,
	transport: ProviderTransport,
	api_key: TokenSecret,
	redirect_uri: Url,
}
impl SteamProvider {
	/// Creates a client from its descriptor, credentials, and transport.
	pub fn new(
		descriptor: ProviderDescriptor,
		config: &SteamConfig,
		transport: ProviderTransport,
	) -> Self {
		Self {
			descriptor,
			transport: transport.with_strategy(Arc::new(SteamStrategy)),
			api_key: TokenSecret::new(config.api_key.clone()),
			redirect_uri: config.redirect_uri.clone(),
		}
	}

	/// Transport used for every outbound call.
	pub fn transport(&self) -> &ProviderTransport {
		&self.transport
	}

	fn web_api(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
		let mut url = endpoint(&self.descriptor.endpoints.account, path)?;

		url.query_pairs_mut().append_pair("key", self.api_key.expose()).extend_pairs(params);

		Ok(url)
	}

	fn store_api(
		&self,
		base: Option<&Url>,
		path: &str,
		params: &[(&str, &str)],
	) -> Option<Result<Url>> {
		let base = base?;

		Some(endpoint(base, path).map(|mut url| {
			url.query_pairs_mut().extend_pairs(params);

			url
		}))
	}

	async fn owned_games(
		&self,
		steam_id: &TokenSecret,
		cancel: &Cancellation,
	) -> Result<OwnedGames> {
		let url = self.web_api(
			"IPlayerService/GetOwnedGames/v1/",
			&[
				("steamid", steam_id.expose()),
				("include_appinfo", "1"),
				("include_played_free_games", "1"),
			],
		)?;
		let body: SteamEnvelope<SteamOwnedGames> =
			self.transport.get_json(ProviderOperation::OwnedGames, url, None, cancel).await?;
		let records = body.response.games.into_iter().map(SteamOwnedGame::into_record).collect();

		Ok(OwnedGames::complete(records))
	}

	async fn profile(
		&self,
		steam_id: &TokenSecret,
		cancel: &Cancellation,
	) -> Result<AccountProfile> {
		let url = self
			.web_api("ISteamUser/GetPlayerSummaries/v2/", &[("steamids", steam_id.expose())])?;
		let body: SteamEnvelope<SteamPlayers> =
			self.transport.get_json(ProviderOperation::AccountProfile, url, None, cancel).await?;
		let player = body.response.players.into_iter().next().ok_or_else(|| {
			Error::Rejected { status: 404, reason: "Steam returned no player for this id".into() }
		})?;

		Ok(AccountProfile {
			provider_user_id: player.steamid,
			display_name: player.personaname,
			avatar_url: player.avatarfull.as_deref().and_then(|raw| Url::parse(raw).ok()),
		})
	}

	async fn search(
		&self,
		query: &str,
		limit: usize,
		cancel: &Cancellation,
	) -> Result<Capability<Vec<ProviderGameRecord>>> {
		let Some(url) = self.store_api(
			self.descriptor.endpoints.search.as_ref(),
			"api/storesearch/",
			&[("term", query), ("cc", "us"), ("l", "english")],
		) else {
			return Ok(Capability::Unsupported);
		};
		let body: SteamSearch =
			self.transport.get_json(ProviderOperation::Search, url?, None, cancel).await?;
		let records = body
			.items
			.into_iter()
			.take(limit)
			.map(|item| {
				let mut record = ProviderGameRecord::new(item.id.to_string(), item.name);

				record.cover_url = item.tiny_image.as_deref().and_then(|raw| Url::parse(raw).ok());
				record.store_url = store_page(item.id);
				record.price = item.price.map(SteamSearchPrice::into_quote);

				record
			})
			.collect();

		Ok(Capability::Supported(records))
	}

	async fn price(
		&self,
		external_id: &ExternalGameId,
		region: &RegionCode,
		cancel: &Cancellation,
	) -> Result<Capability<Option<PriceQuote>>> {
		let Some(url) = self.store_api(
			self.descriptor.endpoints.pricing.as_ref(),
			"api/appdetails",
			&[
				("appids", external_id.as_ref()),
				("cc", region.as_ref()),
				("filters", "price_overview"),
			],
		) else {
			return Ok(Capability::Unsupported);
		};
		let mut body: BTreeMap<String, SteamAppDetails> =
			self.transport.get_json(ProviderOperation::Price, url?, None, cancel).await?;
		let Some(details) = body.remove(external_id.as_ref()) else {
			return Ok(Capability::Supported(None));
		};

		if !details.success {
			return Ok(Capability::Supported(None));
		}

		// Free or unreleased apps come back with `data: []` instead of an object.
		let Some(overview) =
			details.data.and_then(|mut data| data.get_mut("price_overview").map(Value::take))
		else {
			return Ok(Capability::Supported(None));
		};
		let overview: SteamPriceOverview = serde_path_to_error::deserialize(overview)
			.map_err(|source| TransientError::ResponseParse { source, status: Some(200) })?;

		Ok(Capability::Supported(Some(PriceQuote {
			currency: overview.currency,
			initial_minor: overview.initial,
			final_minor: overview.final_price,
			discount_percent: overview.discount_percent,
		})))
	}
}
impl StoreProvider for SteamProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Steam
	}

	fn authorization_url(&self, state: &str) -> Result<Url> {
		let mut return_to = self.redirect_uri.clone();

		return_to.query_pairs_mut().append_pair("state", state);

		let realm = self.redirect_uri.origin().ascii_serialization();
		let mut url = self.descriptor.endpoints.authorization.clone();

		url.query_pairs_mut()
			.append_pair("openid.ns", OPENID_NS)
			.append_pair("openid.mode", "checkid_setup")
			.append_pair("openid.return_to", return_to.as_str())
			.append_pair("openid.realm", &realm)
			.append_pair("openid.identity", OPENID_IDENTIFIER_SELECT)
			.append_pair("openid.claimed_id", OPENID_IDENTIFIER_SELECT);

		Ok(url)
	}

	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, TokenGrant> {
		Box::pin(async move {
			let assertion = OpenIdAssertion::parse(code, &self.redirect_uri)?;
			let response = self
				.transport
				.post_form(
					ProviderOperation::ExchangeCode,
					self.descriptor.endpoints.authorization.clone(),
					&assertion.verification_form(),
					cancel,
				)
				.await?;

			if !is_valid_assertion(response.body()) {
				return Err(Error::AuthExchangeFailed {
					status: Some(response.status().as_u16()),
					reason: "Steam did not confirm the login assertion".into(),
				});
			}

			Ok(TokenGrant::non_expiring(assertion.steam_id))
		})
	}

	fn refresh_access_token<'a>(
		&'a self,
		_refresh_token: &'a TokenSecret,
		_cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<TokenGrant>> {
		Box::pin(async { Ok(Capability::Unsupported) })
	}

	fn fetch_account_profile<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, AccountProfile> {
		Box::pin(self.profile(access_token, cancel))
	}

	fn fetch_owned_games<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, OwnedGames> {
		Box::pin(self.owned_games(access_token, cancel))
	}

	fn search_games<'a>(
		&'a self,
		query: &'a str,
		limit: usize,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Vec<ProviderGameRecord>>> {
		Box::pin(self.search(query, limit, cancel))
	}

	fn fetch_game_price<'a>(
		&'a self,
		external_id: &'a ExternalGameId,
		region: &'a RegionCode,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Option<PriceQuote>>> {
		Box::pin(self.price(external_id, region, cancel))
	}
}

#[derive(Deserialize)]
struct SteamEnvelope<T> {
	response: T,
}

#[derive(Deserialize)]
struct SteamPlayers {
	#[serde(default)]
	players: Vec<SteamPlayer>,
}

#[derive(Deserialize)]
struct SteamPlayer {
	steamid: String,
	personaname: String,
	avatarfull: Option<String>,
}

// Private profiles answer with an empty `response` object.
#[derive(Deserialize)]
struct SteamOwnedGames {
	#[serde(default)]
	games: Vec<SteamOwnedGame>,
}

#[derive(Deserialize)]
struct SteamOwnedGame {
	appid: u64,
	#[serde(default)]
	name: String,
	#[serde(default)]
	playtime_forever: u64,
	#[serde(default)]
	img_icon_url: String,
	#[serde(default)]
	rtime_last_played: i64,
}
impl SteamOwnedGame {
	fn into_record(self) -> ProviderGameRecord {
		let mut record = ProviderGameRecord::new(self.appid.to_string(), self.name)
			.with_playtime_minutes(self.playtime_forever);

		if !self.img_icon_url.is_empty() {
			record.icon_url =
				Url::parse(&format!("{MEDIA_BASE}/{}/{}.jpg", self.appid, self.img_icon_url)).ok();
		}
		if self.rtime_last_played > 0 {
			record.last_played_at =
				OffsetDateTime::from_unix_timestamp(self.rtime_last_played).ok();
		}

		record.cover_url = Url::parse(&format!("{ART_BASE}/{}/header.jpg", self.appid)).ok();
		record.store_url = store_page(self.appid);

		record
	}
}

#[derive(Deserialize)]
struct SteamSearch {
	#[serde(default)]
	items: Vec<SteamSearchItem>,
}

#[derive(Deserialize)]
struct SteamSearchItem {
	id: u64,
	name: String,
	tiny_image: Option<String>,
	price: Option<SteamSearchPrice>,
}

#[derive(Deserialize)]
struct SteamSearchPrice {
	currency: String,
	initial: i64,
	#[serde(rename = "final")]
	final_price: i64,
}
impl SteamSearchPrice {
	fn into_quote(self) -> PriceQuote {
		PriceQuote::new(self.currency, self.initial, self.final_price)
	}
}

#[derive(Deserialize)]
struct SteamAppDetails {
	success: bool,
	data: Option<Value>,
}

#[derive(Deserialize)]
struct SteamPriceOverview {
	currency: String,
	initial: i64,
	#[serde(rename = "final")]
	final_price: i64,
	#[serde(default)]
	discount_percent: u8,
}

fn store_page(app_id: u64) -> Option<Url> {
	Url::parse(&format!("{STORE_PAGE_BASE}/{app_id}")).ok()
}

/// `openid.*` parameters of a positive Steam login assertion.
#[derive(Debug)]
struct OpenIdAssertion {
	params: Vec<(String, String)>,
	steam_id: String,
}
impl OpenIdAssertion {
	fn parse(callback: &str, redirect_uri: &Url) -> Result<Self> {
		let callback = callback.trim();
		let query = match Url::parse(callback) {
			Ok(url) => url.query().unwrap_or_default().to_owned(),
			Err(_) => callback.trim_start_matches('?').to_owned(),
		};
		let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
			.into_owned()
			.filter(|(name, _)| name.starts_with("openid."))
			.collect();
		let steam_id = params
			.iter()
			.find(|(name, _)| name == "openid.claimed_id")
			.and_then(|(_, claimed_id)| claimed_id.strip_prefix(CLAIMED_ID_PREFIX))
			.filter(|id| !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit()))
			.map(str::to_owned)
			.ok_or_else(|| Error::AuthExchangeFailed {
				status: None,
				reason: "Steam login did not carry a Steam claimed id".into(),
			})?;
		let returns_here = params
			.iter()
			.find(|(name, _)| name == "openid.return_to")
			.and_then(|(_, return_to)| Url::parse(return_to).ok())
			.is_some_and(|return_to| {
				return_to.origin() == redirect_uri.origin()
					&& return_to.path() == redirect_uri.path()
			});

		if !returns_here {
			return Err(Error::AuthExchangeFailed {
				status: None,
				reason: "Steam login was issued for another return URL".into(),
			});
		}

		Ok(Self { params, steam_id })
	}

	/// The assertion echoed back with `openid.mode=check_authentication`.
	fn verification_form(&self) -> Vec<(String, String)> {
		let mut form: Vec<_> =
			self.params.iter().filter(|(name, _)| name != "openid.mode").cloned().collect();

		form.push(("openid.mode".into(), "check_authentication".into()));

		form
	}
}

// Steam answers in OpenID key-value form, e.g. `ns:...\nis_valid:true\n`.
fn is_valid_assertion(body: &[u8]) -> bool {
	String::from_utf8_lossy(body)
		.lines()
		.filter_map(|line| line.split_once(':'))
		.any(|(key, value)| key.trim() == "is_valid" && value.trim() == "true")
}
