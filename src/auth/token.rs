//! Plaintext token material as it exists between a provider call and the vault.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access/refresh pair returned by a code exchange or refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Bearer credential for provider API calls.
	pub access_token: TokenSecret,
	/// Refresh credential, when the provider issues one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the access token stops working; `None` when the provider never expires it.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenGrant {
	/// Creates a grant without a refresh credential.
	pub fn new(access_token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			expires_at: Some(expires_at),
		}
	}

	/// Creates a grant for a credential the provider never expires.
	pub fn non_expiring(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), refresh_token: None, expires_at: None }
	}

	/// Attaches a refresh credential.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}

	/// Returns true once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}
}

/// Provider-side identity of a linked account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
	/// Provider-native user identifier.
	pub provider_user_id: String,
	/// Display name shown by the storefront.
	pub display_name: String,
	/// Avatar image, when the storefront exposes one.
	pub avatar_url: Option<Url>,
}
