//! Linked storefront accounts.

// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ProviderKind, UserId},
	vault::SealedSecret,
};

/// Upsert key for a linked account.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey {
	/// Owning user.
	pub user: UserId,
	/// Linked storefront.
	pub provider: ProviderKind,
}
impl AccountKey {
	/// Builds a key.
	pub fn new(user: UserId, provider: ProviderKind) -> Self {
		Self { user, provider }
	}
}
impl Display for AccountKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.user, self.provider)
	}
}

/// A user's link to one storefront.
///
/// Tokens are only ever held sealed; opening them requires the engine's vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStoreAccount {
	/// Identity.
	pub key: AccountKey,
	/// Storefront-native user id.
	pub provider_user_id: String,
	/// Storefront display name.
	pub display_name: String,
	/// Storefront avatar.
	pub avatar_url: Option<Url>,
	/// Sealed access token.
	pub access_token: SealedSecret,
	/// Sealed refresh token.
	pub refresh_token: Option<SealedSecret>,
	/// Access token expiry; `None` for credentials the storefront never expires.
	pub expires_at: Option<OffsetDateTime>,
	/// False once the storefront has rejected the credentials for good.
	pub connected: bool,
	/// Start time of the last sync that reached `Done`.
	pub last_synced_at: Option<OffsetDateTime>,
	/// Whether library imports run automatically after connecting.
	pub auto_import: bool,
	/// Link time.
	pub created_at: OffsetDateTime,
	/// Last write time.
	pub updated_at: OffsetDateTime,
}
impl UserStoreAccount {
	/// Builds a freshly linked account.
	pub fn linked(
		key: AccountKey,
		profile: AccountProfile,
		access_token: SealedSecret,
		refresh_token: Option<SealedSecret>,
		expires_at: Option<OffsetDateTime>,
		now: OffsetDateTime,
	) -> Self {
		Self {
			key,
			provider_user_id: profile.provider_user_id,
			display_name: profile.display_name,
			avatar_url: profile.avatar_url,
			access_token,
			refresh_token,
			expires_at,
			connected: true,
			last_synced_at: None,
			auto_import: true,
			created_at: now,
			updated_at: now,
		}
	}

	/// Returns true when the access token should be refreshed before use.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at <= instant)
	}

	/// Token-free view of the account.
	pub fn summary(&self) -> AccountSummary {
		AccountSummary {
			provider: self.key.provider,
			provider_user_id: self.provider_user_id.clone(),
			display_name: self.display_name.clone(),
			avatar_url: self.avatar_url.clone(),
			connected: self.connected,
			last_synced_at: self.last_synced_at,
			auto_import: self.auto_import,
			expires_at: self.expires_at,
		}
	}
}

/// Targeted account mutation applied atomically by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountPatch {
	/// Replace the sealed tokens after a refresh.
	Tokens {
		/// New sealed access token.
		access_token: SealedSecret,
		/// New sealed refresh token.
		refresh_token: Option<SealedSecret>,
		/// New expiry.
		expires_at: Option<OffsetDateTime>,
	},
	/// Flip the connected flag.
	Connected(bool),
	/// Record a sync that reached `Done`.
	Synced {
		/// Sync start time.
		started_at: OffsetDateTime,
	},
	/// Toggle automatic imports.
	AutoImport(bool),
}
impl AccountPatch {
	/// Applies the patch and stamps `updated_at`.
	pub fn apply(&self, account: &mut UserStoreAccount, now: OffsetDateTime) {
		match self {
			AccountPatch::Tokens { access_token, refresh_token, expires_at } => {
				account.access_token = access_token.clone();
				account.refresh_token = refresh_token.clone();
				account.expires_at = *expires_at;
			},
			AccountPatch::Connected(connected) => account.connected = *connected,
			AccountPatch::Synced { started_at } => account.last_synced_at = Some(*started_at),
			AccountPatch::AutoImport(enabled) => account.auto_import = *enabled,
		}

		account.updated_at = now;
	}
}

/// Account view handed to front ends; carries no token material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
	/// Linked storefront.
	pub provider: ProviderKind,
	/// Storefront-native user id.
	pub provider_user_id: String,
	/// Storefront display name.
	pub display_name: String,
	/// Storefront avatar.
	pub avatar_url: Option<Url>,
	/// Connection state.
	pub connected: bool,
	/// Start time of the last completed sync.
	pub last_synced_at: Option<OffsetDateTime>,
	/// Automatic import flag.
	pub auto_import: bool,
	/// Access token expiry.
	pub expires_at: Option<OffsetDateTime>,
}
