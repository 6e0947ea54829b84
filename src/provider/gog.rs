//! GOG: OAuth 2.0 login, embed API library and search, catalog API pricing.

// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ExternalGameId, ProviderKind, RegionCode, TokenGrant, TokenSecret},
	config::OAuthClientConfig,
	error::ConfigError,
	ext::Cancellation,
	oauth::TokenFacade,
	provider::{
		Capability, OwnedGames, PriceQuote, ProviderDescriptor, ProviderFuture,
		ProviderGameRecord, ProviderOperation, ProviderTransport, StoreProvider,
		transport::endpoint,
	},
};

const STORE_BASE: &str = "https://www.gog.com";

/// GOG storefront client.
#[derive(Debug)]
pub struct GogProvider {
	descriptor: ProviderDescriptor,
	transport: ProviderTransport,
	tokens: TokenFacade,
}
impl GogProvider {
	/// Creates a client from its descriptor, OAuth client, and transport.
	pub fn new(
		descriptor: ProviderDescriptor,
		client: &OAuthClientConfig,
		transport: ProviderTransport,
	) -> Result<Self, ConfigError> {
		let tokens = TokenFacade::from_descriptor(&descriptor, client)?;

		Ok(Self { descriptor, transport, tokens })
	}

	/// Transport used for every outbound call.
	pub fn transport(&self) -> &ProviderTransport {
		&self.transport
	}

	async fn owned_games(
		&self,
		access_token: &TokenSecret,
		cancel: &Cancellation,
	) -> Result<OwnedGames> {
		let max_pages = self.descriptor.quirks.max_pages;
		let mut records = Vec::new();
		let mut page = 1_u32;

		loop {
			let mut url =
				endpoint(self.descriptor.endpoints.library(), "account/getFilteredProducts")?;

			url.query_pairs_mut()
				.append_pair("mediaType", "1")
				.append_pair("page", &page.to_string());

			let body = self
				.transport
				.get_json::<GogProductPage>(
					ProviderOperation::OwnedGames,
					url,
					Some(access_token),
					cancel,
				)
				.await;
			let body = match body {
				Ok(body) => body,
				// Nothing fetched yet means nothing to salvage.
				Err(e) if page == 1 => return Err(e),
				Err(e) => {
					tracing::warn!(
						provider = %ProviderKind::Gog,
						page,
						fetched = records.len(),
						error = %e,
						"Owned-games pagination interrupted."
					);

					return Ok(OwnedGames::partial(records, e));
				},
			};
			let exhausted = body.products.is_empty() || page >= body.total_pages;

			records.extend(body.products.into_iter().map(GogProduct::into_record));

			if exhausted {
				break;
			}
			if page >= max_pages {
				tracing::warn!(
					provider = %ProviderKind::Gog,
					max_pages,
					"Owned-games listing truncated at the page cap."
				);

				break;
			}

			page += 1;
		}

		Ok(OwnedGames::complete(records))
	}

	async fn profile(
		&self,
		access_token: &TokenSecret,
		cancel: &Cancellation,
	) -> Result<AccountProfile> {
		let url = endpoint(&self.descriptor.endpoints.account, "userData.json")?;
		let body: GogUserData = self
			.transport
			.get_json(ProviderOperation::AccountProfile, url, Some(access_token), cancel)
			.await?;

		Ok(AccountProfile {
			provider_user_id: body.user_id,
			display_name: body.username,
			avatar_url: body.avatar.as_deref().and_then(absolute_url),
		})
	}

	async fn search(
		&self,
		query: &str,
		limit: usize,
		cancel: &Cancellation,
	) -> Result<Capability<Vec<ProviderGameRecord>>> {
		let Some(base) = self.descriptor.endpoints.search.as_ref() else {
			return Ok(Capability::Unsupported);
		};
		let mut url = endpoint(base, "games/ajax/filtered")?;

		url.query_pairs_mut()
			.append_pair("mediaType", "game")
			.append_pair("search", query)
			.append_pair("limit", &limit.to_string());

		let body: GogProductPage =
			self.transport.get_json(ProviderOperation::Search, url, None, cancel).await?;
		let records = body.products.into_iter().take(limit).map(GogProduct::into_record).collect();

		Ok(Capability::Supported(records))
	}

	async fn price(
		&self,
		external_id: &ExternalGameId,
		region: &RegionCode,
		cancel: &Cancellation,
	) -> Result<Capability<Option<PriceQuote>>> {
		let Some(base) = self.descriptor.endpoints.pricing.as_ref() else {
			return Ok(Capability::Unsupported);
		};
		let mut url = endpoint(base, &format!("products/{external_id}/prices"))?;

		url.query_pairs_mut().append_pair("countryCode", &region.to_ascii_uppercase());

		let body: GogPrices =
			self.transport.get_json(ProviderOperation::Price, url, None, cancel).await?;

		let quote = body.embedded.prices.into_iter().find_map(GogPrice::into_quote);

		Ok(Capability::Supported(quote))
	}
}
impl StoreProvider for GogProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Gog
	}

	fn authorization_url(&self, state: &str) -> Result<Url> {
		Ok(self.tokens.authorization_url(state, &[("layout", "client2")]))
	}

	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, TokenGrant> {
		Box::pin(self.tokens.exchange_code(&self.transport, code, cancel))
	}

	fn refresh_access_token<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
		cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<TokenGrant>> {
		Box::pin(async move {
			if !self.descriptor.supports(ProviderOperation::RefreshToken) {
				return Ok(Capability::Unsupported);
			}

			self.tokens
				.refresh(&self.transport, refresh_token.expose(), cancel)
				.await
				.map(Capability::Supported)
		})
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
#[serde(rename_all = "camelCase")]
struct GogUserData {
	user_id: String,
	username: String,
	avatar: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GogProductPage {
	#[serde(default)]
	products: Vec<GogProduct>,
	#[serde(default)]
	total_pages: u32,
}

#[derive(Deserialize)]
struct GogProduct {
	id: u64,
	title: String,
	image: Option<String>,
	url: Option<String>,
}
impl GogProduct {
	fn into_record(self) -> ProviderGameRecord {
		let mut record = ProviderGameRecord::new(self.id.to_string(), self.title);

		record.cover_url = self.image.as_deref().and_then(absolute_url);
		record.store_url = self.url.as_deref().and_then(absolute_url);

		record
	}
}

#[derive(Deserialize)]
struct GogPrices {
	#[serde(rename = "_embedded")]
	embedded: GogEmbeddedPrices,
}

#[derive(Deserialize)]
struct GogEmbeddedPrices {
	#[serde(default)]
	prices: Vec<GogPrice>,
}

// Amounts arrive as `"1999 USD"`: minor units followed by the currency code.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GogPrice {
	base_price: String,
	final_price: String,
}
impl GogPrice {
	fn into_quote(self) -> Option<PriceQuote> {
		let (initial, currency) = split_amount(&self.base_price)?;
		let (final_minor, _) = split_amount(&self.final_price)?;

		Some(PriceQuote::new(currency, initial, final_minor))
	}
}

fn split_amount(raw: &str) -> Option<(i64, String)> {
	let (amount, currency) = raw.trim().split_once(' ')?;

	Some((amount.parse().ok()?, currency.trim().to_owned()))
}

// GOG hands out protocol-relative image links and site-relative product links.
fn absolute_url(raw: &str) -> Option<Url> {
	if raw.is_empty() {
		return None;
	}
	if let Some(rest) = raw.strip_prefix("//") {
		return Url::parse(&format!("https://{rest}")).ok();
	}
	if raw.starts_with('/') {
		return Url::parse(&format!("{STORE_BASE}{raw}")).ok();
	}

	Url::parse(raw).ok()
}
