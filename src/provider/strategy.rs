//! Provider strategy hooks that classify storefront failures.
//!
//! Implementations stay HTTP-client agnostic: they see only primitive data (status,
//! OAuth fields, a body preview) and return a [`ProviderErrorKind`]. [`into_error`]
//! then turns that kind into the engine error appropriate for the failing operation.

// self
use crate::{_prelude::*, error::TransientError, provider::ProviderOperation};

/// Strategy hook that allows providers to classify errors and detect consent prompts.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed response into the engine taxonomy.
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Extracts a consent continuation URL from an error body, if the provider sent one.
	///
	/// The default implementation never detects consent prompts.
	fn consent_continuation(&self, _body: &[u8]) -> Option<Url> {
		None
	}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// The user's grant (code, access, or refresh token) is no longer accepted.
	InvalidGrant,
	/// The engine's client credentials were rejected.
	InvalidClient,
	/// The request itself was refused (unknown id, bad parameter).
	Rejected,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Operation that failed.
	pub operation: ProviderOperation,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body.
	pub body_preview: Option<String>,
	/// Retry-After hint from upstream, if supplied.
	pub retry_after: Option<Duration>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided operation.
	pub fn new(operation: ProviderOperation) -> Self {
		Self {
			operation,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			retry_after: None,
		}
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a log-friendly length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Adds a Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
		self.retry_after = retry_after;

		self
	}

	fn summary(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.oauth_error.clone())
			.or_else(|| self.body_preview.clone().filter(|body| !body.trim().is_empty()))
			.unwrap_or_else(|| match self.http_status {
				Some(status) => format!("{} returned HTTP {status}", self.operation),
				None => format!("{} failed", self.operation),
			})
	}
}

/// Default strategy that applies OAuth- and HTTP-guided heuristics.
///
/// It prioritizes structured OAuth fields (`error`, `error_description`), then
/// falls back to body text hints, and finally the HTTP status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.operation, ctx.http_status)
	}
}

/// Converts a classified failure into the engine error for `ctx.operation`.
///
/// Every failed code exchange surfaces as [`Error::AuthExchangeFailed`]; a rejected grant
/// anywhere else means the stored credentials expired.
pub fn into_error(kind: ProviderErrorKind, ctx: &ProviderErrorContext) -> Error {
	let reason = ctx.summary();

	if ctx.operation == ProviderOperation::ExchangeCode {
		return Error::AuthExchangeFailed { status: ctx.http_status, reason };
	}

	match kind {
		ProviderErrorKind::InvalidGrant => Error::AuthExpired { reason },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
		ProviderErrorKind::Rejected =>
			Error::Rejected { status: ctx.http_status.unwrap_or_default(), reason },
		ProviderErrorKind::Transient => TransientError::Upstream {
			message: reason,
			status: ctx.http_status,
			retry_after: ctx.retry_after,
		}
		.into(),
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = String::new();

	for (idx, ch) in body.chars().enumerate() {
		if idx >= ProviderErrorContext::BODY_PREVIEW_LIMIT {
			buf.push('…');

			break;
		}
		buf.push(ch);
	}

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant")
		|| value.eq_ignore_ascii_case("access_denied")
		|| value.eq_ignore_ascii_case("invalid_token")
	{
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_request")
		|| value.eq_ignore_ascii_case("invalid_scope")
	{
		Some(ProviderErrorKind::Rejected)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let body = body?;
	let lowered = body.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("invalid_token") =>
			Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("temporarily_unavailable") => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(operation: ProviderOperation, status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) if operation.is_token_grant() => ProviderErrorKind::InvalidGrant,
		Some(401) if operation.is_token_grant() => ProviderErrorKind::InvalidClient,
		Some(401 | 403) => ProviderErrorKind::InvalidGrant,
		Some(408 | 429) => ProviderErrorKind::Transient,
		Some(code) if code >= 500 => ProviderErrorKind::Transient,
		Some(_) => ProviderErrorKind::Rejected,
		None => ProviderErrorKind::Transient,
	}
}
