//! Epic Games Store: OAuth 2.0 login, account API profile, library-service ownership.
//!
//! Epic has no public search or price API for third parties, so those capabilities
//! report `Unsupported`.

// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ExternalGameId, ProviderKind, RegionCode, TokenGrant, TokenSecret},
	config::OAuthClientConfig,
	error::ConfigError,
	ext::Cancellation,
	oauth::TokenFacade,
	provider::{
		Capability, DefaultProviderStrategy, OwnedGames, PriceQuote, ProviderDescriptor,
		ProviderErrorContext, ProviderErrorKind, ProviderFuture, ProviderGameRecord,
		ProviderOperation, ProviderStrategy, ProviderTransport, StoreProvider,
		transport::endpoint,
	},
};

const SCOPE_CONSENT: &str = "SCOPE_CONSENT";

/// Recognizes Epic's `SCOPE_CONSENT` corrective action on token-endpoint failures.
#[derive(Debug, Default)]
pub struct EpicStrategy;
impl ProviderStrategy for EpicStrategy {
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_error(ctx)
	}

	fn consent_continuation(&self, body: &[u8]) -> Option<Url> {
		let error = serde_json::from_slice::<EpicErrorBody>(body).ok()?;

		if error.corrective_action.as_deref() != Some(SCOPE_CONSENT) {
			return None;
		}

		error.continuation_url.as_deref().and_then(|raw| Url::parse(raw).ok())
	}
}

/// Epic Games Store client.
#[derive(Debug)]
pub struct EpicProvider {
	descriptor: ProviderDescriptor,
	transport: ProviderTransport,
	tokens: TokenFacade,
}
impl EpicProvider {
	/// Creates a client from its descriptor, OAuth client, and transport.
	pub fn new(
		descriptor: ProviderDescriptor,
		client: &OAuthClientConfig,
		transport: ProviderTransport,
	) -> Result<Self, ConfigError> {
		let tokens = TokenFacade::from_descriptor(&descriptor, client)?;

		Ok(Self { descriptor, transport: transport.with_strategy(Arc::new(EpicStrategy)), tokens })
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
		let mut cursor: Option<String> = None;

		for page in 1..=max_pages {
			let mut url =
				endpoint(self.descriptor.endpoints.library(), "library/api/public/items")?;

			url.query_pairs_mut().append_pair("includeMetadata", "true");

			if let Some(cursor) = &cursor {
				url.query_pairs_mut().append_pair("cursor", cursor);
			}

			let body = match self
				.transport
				.get_json::<EpicLibraryPage>(
					ProviderOperation::OwnedGames,
					url,
					Some(access_token),
					cancel,
				)
				.await
			{
				Ok(body) => body,
				Err(e) if page == 1 => return Err(e),
				Err(e) => {
					tracing::warn!(
						provider = %ProviderKind::Epic,
						page,
						fetched = records.len(),
						error = %e,
						"Owned-games pagination interrupted."
					);

					return Ok(OwnedGames::partial(records, e));
				},
			};

			records.extend(body.records.into_iter().filter_map(EpicLibraryItem::into_record));
			cursor = body.response_metadata.and_then(|meta| meta.next_cursor);

			if cursor.is_none() {
				return Ok(OwnedGames::complete(records));
			}
		}

		tracing::warn!(
			provider = %ProviderKind::Epic,
			max_pages,
			"Owned-games listing truncated at the page cap."
		);

		Ok(OwnedGames::complete(records))
	}

	async fn profile(
		&self,
		access_token: &TokenSecret,
		cancel: &Cancellation,
	) -> Result<AccountProfile> {
		let url = endpoint(&self.descriptor.endpoints.account, "epic/oauth/v2/userInfo")?;
		let body: EpicUserInfo = self
			.transport
			.get_json(ProviderOperation::AccountProfile, url, Some(access_token), cancel)
			.await?;
		let display_name = body.display_name.unwrap_or_else(|| body.account_id.clone());

		Ok(AccountProfile { provider_user_id: body.account_id, display_name, avatar_url: None })
	}
}
impl StoreProvider for EpicProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Epic
	}

	fn authorization_url(&self, state: &str) -> Result<Url> {
		Ok(self.tokens.authorization_url(state, &[]))
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
		_query: &'a str,
		_limit: usize,
		_cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Vec<ProviderGameRecord>>> {
		Box::pin(async { Ok(Capability::Unsupported) })
	}

	fn fetch_game_price<'a>(
		&'a self,
		_external_id: &'a ExternalGameId,
		_region: &'a RegionCode,
		_cancel: &'a Cancellation,
	) -> ProviderFuture<'a, Capability<Option<PriceQuote>>> {
		Box::pin(async { Ok(Capability::Unsupported) })
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpicErrorBody {
	corrective_action: Option<String>,
	continuation_url: Option<String>,
}

#[derive(Deserialize)]
struct EpicUserInfo {
	#[serde(alias = "sub")]
	account_id: String,
	#[serde(rename = "displayName", alias = "preferred_username")]
	display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpicLibraryPage {
	#[serde(default)]
	records: Vec<EpicLibraryItem>,
	response_metadata: Option<EpicResponseMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpicResponseMetadata {
	next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpicLibraryItem {
	catalog_item_id: Option<String>,
	app_name: Option<String>,
	sandbox_name: Option<String>,
}
impl EpicLibraryItem {
	// Entries without any identifier are engine add-ons, not games.
	fn into_record(self) -> Option<ProviderGameRecord> {
		let external_id = self.catalog_item_id.or_else(|| self.app_name.clone())?;
		let name = self.sandbox_name.or(self.app_name).unwrap_or_else(|| external_id.clone());

		Some(ProviderGameRecord::new(external_id, name))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scope_consent_bodies_yield_continuation_urls() {
		let body = br#"{
			"errorCode": "errors.com.epicgames.oauth.corrective_action_required",
			"correctiveAction": "SCOPE_CONSENT",
			"continuationUrl": "https://www.epicgames.com/id/login/consent?x=1"
		}"#;

		assert_eq!(
			EpicStrategy.consent_continuation(body).map(String::from).as_deref(),
			Some("https://www.epicgames.com/id/login/consent?x=1")
		);
		assert!(EpicStrategy.consent_continuation(br#"{"correctiveAction":"OTHER"}"#).is_none());
		assert!(EpicStrategy.consent_continuation(b"not json").is_none());
	}

	#[test]
	fn library_items_fall_back_across_identifiers() {
		let item = EpicLibraryItem {
			catalog_item_id: None,
			app_name: Some("Fortnite".into()),
			sandbox_name: None,
		};
		let record = item.into_record().expect("App name should be enough.");

		assert_eq!(record.external_id, "Fortnite");
		assert_eq!(record.name, "Fortnite");
		assert!(
			EpicLibraryItem { catalog_item_id: None, app_name: None, sandbox_name: None }
				.into_record()
				.is_none()
		);
	}
}
