//! OAuth 2.0 token-endpoint facade shared by the OAuth-based storefront clients.

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
	EndpointSet, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::TokenGrant,
	config::OAuthClientConfig,
	error::{ConfigError, TransientError},
	ext::Cancellation,
	http::{InstrumentedHandle, ResponseMetadata, ResponseMetadataSlot},
	provider::{
		ClientAuthMethod, ProviderDescriptor, ProviderErrorContext, ProviderOperation,
		ProviderQuirks, ProviderTransport, into_error,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Authorization-code and refresh-token grants routed through a [`ProviderTransport`].
pub(crate) struct TokenFacade {
	oauth_client: ConfiguredBasicClient,
	quirks: ProviderQuirks,
}
impl TokenFacade {
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client: &OAuthClientConfig,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let token_endpoint = descriptor.endpoints.token.as_ref().ok_or_else(|| {
			ConfigError::invalid_setting(
				format!("providers.{}.token_endpoint", descriptor.kind),
				"is required for OAuth logins",
			)
		})?;
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let redirect_url = RedirectUrl::new(client.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if !matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::None) {
			oauth_client =
				oauth_client.set_client_secret(ClientSecret::new(client.client_secret.clone()));
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, quirks: descriptor.quirks.clone() })
	}

	/// Builds the authorization URL with `state` and any provider-specific parameters.
	pub(crate) fn authorization_url(&self, state: &str, extra: &[(&str, &str)]) -> Url {
		let state = state.to_owned();
		let mut request = self.oauth_client.authorize_url(move || CsrfToken::new(state));

		if let Some(scope) = self.quirks.joined_scopes() {
			request = request.add_extra_param("scope", scope);
		}
		for (key, value) in extra {
			request = request.add_extra_param(*key, *value);
		}

		request.url().0
	}

	pub(crate) async fn exchange_code(
		&self,
		transport: &ProviderTransport,
		code: &str,
		cancel: &Cancellation,
	) -> Result<TokenGrant> {
		let operation = ProviderOperation::ExchangeCode;
		let slot = ResponseMetadataSlot::default();
		let handle = InstrumentedHandle::new(transport.http(), slot.clone());
		let request = self.oauth_client.exchange_code(AuthorizationCode::new(code.to_owned()));
		let response = transport
			.guarded(operation, cancel, async {
				request
					.request_async(&handle)
					.await
					.map_err(|err| map_request_error(transport, operation, slot.take(), err))
			})
			.await?;

		Ok(self.grant_from(response, None))
	}

	pub(crate) async fn refresh(
		&self,
		transport: &ProviderTransport,
		refresh_token: &str,
		cancel: &Cancellation,
	) -> Result<TokenGrant> {
		let operation = ProviderOperation::RefreshToken;
		let slot = ResponseMetadataSlot::default();
		let handle = InstrumentedHandle::new(transport.http(), slot.clone());
		let secret = RefreshToken::new(refresh_token.to_owned());
		let request = self.oauth_client.exchange_refresh_token(&secret);
		let response = transport
			.guarded(operation, cancel, async {
				request
					.request_async(&handle)
					.await
					.map_err(|err| map_request_error(transport, operation, slot.take(), err))
			})
			.await?;

		// Providers that do not rotate refresh tokens expect the old one to keep working.
		Ok(self.grant_from(response, Some(refresh_token)))
	}

	fn grant_from(
		&self,
		response: BasicTokenResponse,
		previous_refresh: Option<&str>,
	) -> TokenGrant {
		let lifetime = response
			.expires_in()
			.and_then(|expires_in| i64::try_from(expires_in.as_secs()).ok())
			.filter(|secs| *secs > 0)
			.map_or(self.quirks.default_token_lifetime, Duration::seconds);
		let grant = TokenGrant::new(
			response.access_token().secret().to_owned(),
			OffsetDateTime::now_utc() + lifetime,
		);
		let refresh = response
			.refresh_token()
			.map(|token| token.secret().to_owned())
			.or_else(|| previous_refresh.map(str::to_owned));

		match refresh {
			Some(refresh) => grant.with_refresh_token(refresh),
			None => grant,
		}
	}
}
impl Debug for TokenFacade {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenFacade").field("quirks", &self.quirks).finish_non_exhaustive()
	}
}

fn map_request_error(
	transport: &ProviderTransport,
	operation: ProviderOperation,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<Error>,
) -> Error {
	let status = meta.as_ref().and_then(|meta| meta.status);
	let retry_after = meta.as_ref().and_then(|meta| meta.retry_after);
	let failed_status = status.filter(|code| !(200..300).contains(code));

	match err {
		RequestTokenError::ServerResponse(response) => {
			let mut ctx = ProviderErrorContext::new(operation)
				.with_oauth_error(response.error().as_ref())
				.with_retry_after(retry_after);

			if let Some(description) = response.error_description() {
				ctx = ctx.with_error_description(description.clone());
			}
			if let Some(status) = status {
				ctx = ctx.with_http_status(status);
			}

			into_error(transport.strategy().classify_error(&ctx), &ctx)
		},
		RequestTokenError::Request(error) => error,
		RequestTokenError::Parse(source, body) => match failed_status {
			Some(status) => transport.classify(operation, status, &body, retry_after),
			None => TransientError::ResponseParse { source, status }.into(),
		},
		RequestTokenError::Other(message) => match failed_status {
			Some(status) => transport.classify(operation, status, message.as_bytes(), retry_after),
			None => TransientError::Upstream { message, status, retry_after }.into(),
		},
	}
}
