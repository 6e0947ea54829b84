//! Account linking: login URLs, code exchange, and account bookkeeping.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{AccountProfile, ProviderKind, TokenGrant, UserId},
	ext::Cancellation,
	flows::{SyncEngine, SyncHandle},
	model::{AccountKey, AccountPatch, AccountSummary, UserStoreAccount},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::StoreProvider,
};

const STATE_LEN: usize = 32;

/// Login redirect handed to the front end.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Storefront the user is sent to.
	pub provider: ProviderKind,
	/// Fully-formed login URL.
	pub url: Url,
	/// Anti-forgery value that must come back with the redirect.
	pub state: String,
}
impl AuthorizationRequest {
	/// Validates the `state` returned by the storefront redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::AuthExchangeFailed {
				status: None,
				reason: "authorization state mismatch".into(),
			})
		}
	}
}

/// Result of [`SyncEngine::connect_account`].
#[derive(Debug)]
pub enum ConnectOutcome {
	/// Account linked (or re-linked).
	Connected {
		/// Token-free view of the stored account.
		account: AccountSummary,
		/// Initial library import, when automatic imports are on.
		initial_sync: Option<SyncHandle>,
	},
	/// The storefront wants more consent before it hands out tokens.
	ConsentRequired {
		/// Page the user must visit.
		continuation_url: Url,
	},
}
impl ConnectOutcome {
	/// Returns the linked account, if any.
	pub fn account(&self) -> Option<&AccountSummary> {
		match self {
			ConnectOutcome::Connected { account, .. } => Some(account),
			ConnectOutcome::ConsentRequired { .. } => None,
		}
	}

	/// Takes the initial sync handle out of the outcome.
	pub fn take_initial_sync(&mut self) -> Option<SyncHandle> {
		match self {
			ConnectOutcome::Connected { initial_sync, .. } => initial_sync.take(),
			ConnectOutcome::ConsentRequired { .. } => None,
		}
	}
}

impl SyncEngine {
	/// Builds the storefront login URL with a fresh anti-forgery state.
	pub fn authorization_url(&self, provider: ProviderKind) -> Result<AuthorizationRequest> {
		let client = self.registry.get(provider)?;
		let state = random_state();
		let url = client.authorization_url(&state)?;

		Ok(AuthorizationRequest { provider, url, state })
	}

	/// Links `provider` for `user` using the code from the login redirect.
	pub async fn connect_account(
		&self,
		user: &UserId,
		provider: ProviderKind,
		code: &str,
	) -> Result<ConnectOutcome> {
		self.connect_account_with(user, provider, code, &Cancellation::new()).await
	}

	/// Same as [`SyncEngine::connect_account`] with a caller-owned cancellation signal.
	///
	/// Tokens are sealed before they reach the store. Re-linking keeps the account's creation
	/// time, last sync time, and import preference. When imports are automatic the initial
	/// sync is dispatched as a task whose handle is returned to the caller.
	pub async fn connect_account_with(
		&self,
		user: &UserId,
		provider: ProviderKind,
		code: &str,
		cancel: &Cancellation,
	) -> Result<ConnectOutcome> {
		const KIND: FlowKind = FlowKind::Connect;

		let span = FlowSpan::for_provider(KIND, "connect_account", provider);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let client = self.registry.get(provider)?;
				let (grant, profile) = match link(client.as_ref(), code, cancel).await {
					Ok(linked) => linked,
					Err(Error::ConsentRequired { continuation_url }) => {
						tracing::info!(%continuation_url, "Storefront asked for more consent.");

						return Ok(ConnectOutcome::ConsentRequired { continuation_url });
					},
					Err(e) => return Err(e),
				};
				let key = AccountKey::new(user.clone(), provider);
				let now = self.now();
				let access_token = self.vault().seal_token(&grant.access_token)?;
				let refresh_token = grant
					.refresh_token
					.as_ref()
					.map(|secret| self.vault().seal_token(secret))
					.transpose()?;
				let mut account = UserStoreAccount::linked(
					key.clone(),
					profile,
					access_token,
					refresh_token,
					grant.expires_at,
					now,
				);

				if let Some(existing) = self.store.fetch_account(&key).await? {
					account.created_at = existing.created_at;
					account.last_synced_at = existing.last_synced_at;
					account.auto_import = existing.auto_import;
				}

				self.store.save_account(account.clone()).await?;

				tracing::info!(account = %key, "Storefront account linked.");

				let initial_sync =
					account.auto_import.then(|| self.spawn_library_sync(user.clone(), provider));

				Ok(ConnectOutcome::Connected { account: account.summary(), initial_sync })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Unlinks an account, dropping its sealed tokens and cancelling a running sync.
	///
	/// Library entries imported so far are kept. Returns false when nothing was linked.
	pub async fn disconnect_account(&self, user: &UserId, provider: ProviderKind) -> Result<bool> {
		let key = AccountKey::new(user.clone(), provider);

		if self.tracker.forget(&key) {
			tracing::info!(account = %key, "Cancelled in-flight sync for disconnected account.");
		}

		let removed = self.store.delete_account(&key).await?;

		if removed {
			tracing::info!(account = %key, "Storefront account unlinked.");
		}

		Ok(removed)
	}

	/// Lists a user's linked accounts without token material.
	pub async fn list_accounts(&self, user: &UserId) -> Result<Vec<AccountSummary>> {
		let accounts = self.store.list_accounts(user).await?;

		Ok(accounts.iter().map(UserStoreAccount::summary).collect())
	}

	/// Turns automatic library imports on or off for one account.
	pub async fn set_auto_import(
		&self,
		user: &UserId,
		provider: ProviderKind,
		enabled: bool,
	) -> Result<AccountSummary> {
		let key = AccountKey::new(user.clone(), provider);
		let account = self
			.store
			.patch_account(&key, AccountPatch::AutoImport(enabled), self.now())
			.await?
			.ok_or(Error::NotConnected { provider })?;

		Ok(account.summary())
	}
}

async fn link(
	client: &dyn StoreProvider,
	code: &str,
	cancel: &Cancellation,
) -> Result<(TokenGrant, AccountProfile)> {
	let grant = client.exchange_code(code, cancel).await?;
	let profile = client.fetch_account_profile(&grant.access_token, cancel).await?;

	Ok((grant, profile))
}

fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn state_is_long_and_unique() {
		let first = random_state();
		let second = random_state();

		assert_eq!(first.len(), STATE_LEN);
		assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
		assert_ne!(first, second);
	}

	#[test]
	fn mismatched_state_is_rejected() {
		let request = AuthorizationRequest {
			provider: ProviderKind::Gog,
			url: Url::parse("https://login.gog.com/auth").expect("Fixture URL should parse."),
			state: "expected".into(),
		};

		assert!(request.validate_state("expected").is_ok());
		assert!(matches!(
			request.validate_state("forged"),
			Err(Error::AuthExchangeFailed { status: None, .. })
		));
	}
}
