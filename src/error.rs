//! Engine-level error types shared across providers, flows, and stores.

// self
use crate::{_prelude::*, auth::ProviderKind, provider::ProviderDescriptorError};

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Provider refused to exchange an authorization code.
	#[error("Authorization code exchange failed: {reason}.")]
	AuthExchangeFailed {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Stored credentials are expired or revoked and cannot be refreshed.
	#[error("Provider credentials expired: {reason}.")]
	AuthExpired {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Provider demands additional consent before granting access.
	#[error("Provider requires additional consent at {continuation_url}.")]
	ConsentRequired {
		/// URL the end user must visit to grant the missing consent.
		continuation_url: Url,
	},
	/// Provider does not offer the requested capability.
	#[error("Provider `{provider}` does not support {operation}.")]
	Unsupported {
		/// Provider lacking the capability.
		provider: ProviderKind,
		/// Operation label.
		operation: &'static str,
	},
	/// Sealed credential could not be opened (tampered payload or wrong key).
	#[error("Sealed credential could not be decrypted.")]
	DecryptionFailed,
	/// Credential could not be sealed.
	#[error("Credential could not be encrypted.")]
	EncryptionFailed,
	/// Provider record cannot be mapped onto the catalog.
	#[error("Catalog reconciliation conflict: {reason}.")]
	ReconciliationConflict {
		/// Engine-supplied reason string.
		reason: String,
	},
	/// User has no connected account for the provider.
	#[error("No connected `{provider}` account for this user.")]
	NotConnected {
		/// Provider the caller asked for.
		provider: ProviderKind,
	},
	/// Provider rejected the client credentials configured for this engine.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Provider rejected the request for a non-credential reason.
	#[error("Provider rejected the request with status {status}: {reason}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Provider- or engine-supplied reason string.
		reason: String,
	},
	/// Referenced row does not exist.
	#[error("No {entity} with id `{id}`.")]
	NotFound {
		/// Kind of row.
		entity: &'static str,
		/// Identifier the caller supplied.
		id: String,
	},
	/// Caller-supplied value is out of range or malformed.
	#[error("Invalid `{field}`: {reason}.")]
	InvalidInput {
		/// Field the caller set.
		field: &'static str,
		/// Engine-supplied reason string.
		reason: String,
	},
	/// Caller cancelled the operation before it completed.
	#[error("Operation was cancelled.")]
	Cancelled,
}
impl Error {
	/// Returns true when retrying later may succeed without user action.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}

	/// Returns true when the stored account can no longer be used and must be re-linked.
	pub fn requires_relink(&self) -> bool {
		matches!(self, Self::AuthExpired { .. } | Self::DecryptionFailed)
	}

	/// Retry-After hint carried by the error, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::Upstream { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the engine.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider endpoint cannot be parsed.
	#[error("Provider endpoint is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] ProviderDescriptorError),
	/// Vault key is not configured.
	#[error("Vault key `{variable}` is not set.")]
	MissingVaultKey {
		/// Environment variable that should carry the key.
		variable: &'static str,
	},
	/// Vault key is malformed.
	#[error("Vault key is invalid: {reason}.")]
	InvalidVaultKey {
		/// Human-readable reason.
		reason: &'static str,
	},
	/// Provider is missing a credential required by its client.
	#[error("Provider `{provider}` is missing the `{field}` setting.")]
	MissingCredential {
		/// Provider being configured.
		provider: ProviderKind,
		/// Missing setting name.
		field: &'static str,
	},
	/// A configuration value could not be interpreted.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: String,
		/// Human-readable reason.
		reason: String,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration document is malformed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_setting(name: impl Into<String>, reason: impl Display) -> Self {
		Self::InvalidSetting { name: name.into(), reason: reason.to_string() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Provider returned an unexpected response: {message}.")]
	Upstream {
		/// Provider- or engine-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider responded with malformed JSON that could not be parsed.
	#[error("Provider returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Call exceeded its deadline.
	#[error("The {operation} call exceeded its {deadline} deadline.")]
	Timeout {
		/// Operation label.
		operation: &'static str,
		/// Deadline that elapsed.
		deadline: Duration,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
