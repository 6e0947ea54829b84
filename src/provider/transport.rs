//! Guarded HTTP path shared by every storefront client.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{Method, Request, header},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{ProviderKind, TokenSecret},
	error::{ConfigError, TransientError},
	ext::{Cancellation, RateLimitSettings, RateLimiter},
	http::{ResponseMetadataSlot, StoreHttpClient, parse_retry_after},
	provider::{
		DefaultProviderStrategy, ProviderErrorContext, ProviderOperation, ProviderStrategy,
		into_error,
	},
};

/// Rate-limited, deadline-bound access to one provider's HTTP APIs.
///
/// Each provider client owns exactly one transport and therefore exactly one bucket.
pub struct ProviderTransport {
	kind: ProviderKind,
	http: Arc<dyn StoreHttpClient>,
	limiter: Arc<RateLimiter>,
	strategy: Arc<dyn ProviderStrategy>,
	timeout: Duration,
}
impl ProviderTransport {
	/// Creates a transport with a fresh bucket and the default error strategy.
	pub fn new(
		kind: ProviderKind,
		http: Arc<dyn StoreHttpClient>,
		settings: RateLimitSettings,
		timeout: Duration,
	) -> Self {
		Self {
			kind,
			http,
			limiter: Arc::new(RateLimiter::new(kind, settings)),
			strategy: Arc::new(DefaultProviderStrategy),
			timeout,
		}
	}

	/// Replaces the error classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Storefront this transport talks to.
	pub fn kind(&self) -> ProviderKind {
		self.kind
	}

	/// Bucket guarding this provider.
	pub fn limiter(&self) -> &Arc<RateLimiter> {
		&self.limiter
	}

	/// Per-call deadline.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	pub(crate) fn http(&self) -> Arc<dyn StoreHttpClient> {
		self.http.clone()
	}

	/// Runs `call` once a permit is granted, bounded by the deadline and `cancel`.
	pub async fn guarded<T, F>(
		&self,
		operation: ProviderOperation,
		cancel: &Cancellation,
		call: F,
	) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		cancel
			.run(async {
				self.limiter.acquire(operation.as_str(), cancel).await?;

				match tokio::time::timeout(self.timeout.unsigned_abs(), call).await {
					Ok(result) => result,
					Err(_) => Err(TransientError::Timeout {
						operation: operation.as_str(),
						deadline: self.timeout,
					}
					.into()),
				}
			})
			.await
	}

	/// Sends `request` and turns every non-2xx response into a classified error.
	pub async fn send(
		&self,
		operation: ProviderOperation,
		request: HttpRequest,
		cancel: &Cancellation,
	) -> Result<HttpResponse> {
		let slot = ResponseMetadataSlot::default();
		let response =
			self.guarded(operation, cancel, self.http.execute(request, slot.clone())).await?;
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}

		let retry_after = slot
			.take()
			.and_then(|meta| meta.retry_after)
			.or_else(|| parse_retry_after(response.headers()));

		Err(self.classify(operation, status.as_u16(), response.body(), retry_after))
	}

	/// Issues a JSON `GET`, optionally with a bearer token, and decodes the body.
	pub async fn get_json<T>(
		&self,
		operation: ProviderOperation,
		url: Url,
		bearer: Option<&TokenSecret>,
		cancel: &Cancellation,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut builder = Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.header(header::ACCEPT, "application/json");

		if let Some(token) = bearer {
			builder =
				builder.header(header::AUTHORIZATION, format!("Bearer {}", token.expose()));
		}

		let request = builder.body(Vec::new()).map_err(ConfigError::from)?;
		let response = self.send(operation, request, cancel).await?;

		parse_json(response.body(), Some(response.status().as_u16()))
	}

	/// Issues a form-encoded `POST` and returns the successful response as is.
	pub async fn post_form(
		&self,
		operation: ProviderOperation,
		url: Url,
		params: &[(String, String)],
		cancel: &Cancellation,
	) -> Result<HttpResponse> {
		let body =
			url::form_urlencoded::Serializer::new(String::new()).extend_pairs(params).finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;

		self.send(operation, request, cancel).await
	}

	/// Classifies a failed response; a 429 with a hint also pauses the bucket.
	pub(crate) fn classify(
		&self,
		operation: ProviderOperation,
		status: u16,
		body: &[u8],
		retry_after: Option<Duration>,
	) -> Error {
		if let Some(continuation_url) = self.strategy.consent_continuation(body) {
			return Error::ConsentRequired { continuation_url };
		}
		if status == 429 {
			if let Some(backoff) = retry_after {
				self.limiter.defer_for(backoff);
			}
		}

		let mut ctx = ProviderErrorContext::new(operation)
			.with_http_status(status)
			.with_retry_after(retry_after);

		match serde_json::from_slice::<OAuthErrorBody>(body) {
			Ok(oauth) => {
				ctx = ctx.with_oauth_error(oauth.error);

				if let Some(description) = oauth.error_description {
					ctx = ctx.with_error_description(description);
				}
			},
			Err(_) => ctx = ctx.with_body_preview(String::from_utf8_lossy(body)),
		}

		let kind = self.strategy.classify_error(&ctx);

		tracing::debug!(
			provider = %self.kind,
			operation = %operation,
			status,
			kind = ?kind,
			"Provider call failed."
		);

		into_error(kind, &ctx)
	}

	pub(crate) fn strategy(&self) -> &dyn ProviderStrategy {
		self.strategy.as_ref()
	}
}
impl Debug for ProviderTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderTransport")
			.field("kind", &self.kind)
			.field("settings", &self.limiter.settings())
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[derive(Deserialize)]
struct OAuthErrorBody {
	error: String,
	error_description: Option<String>,
}

/// Decodes a provider JSON body, reporting the failing path on error.
pub(crate) fn parse_json<T>(body: &[u8], status: Option<u16>) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::ResponseParse { source, status }.into())
}

/// Appends `path` to `base`, tolerating stray slashes on either side.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
	let joined =
		format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));

	Url::parse(&joined).map_err(|source| ConfigError::InvalidEndpoint { source }.into())
}
