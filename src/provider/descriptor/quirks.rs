// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how clients behave.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Scopes requested on the authorization URL.
	pub scopes: Vec<String>,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Whether the token endpoint honors `grant_type=refresh_token`.
	pub refresh_supported: bool,
	/// Lifetime assumed when a token response omits `expires_in`.
	pub default_token_lifetime: Duration,
	/// Upper bound on pages walked while listing owned games.
	pub max_pages: u32,
}
impl ProviderQuirks {
	/// Joins the configured scopes with the provider's delimiter.
	pub fn joined_scopes(&self) -> Option<String> {
		if self.scopes.is_empty() {
			return None;
		}

		let mut buf = String::new();

		for (idx, value) in self.scopes.iter().enumerate() {
			if idx > 0 {
				buf.push(self.scope_delimiter);
			}

			buf.push_str(value);
		}

		Some(buf)
	}
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self {
			scopes: Vec::new(),
			scope_delimiter: ' ',
			refresh_supported: true,
			default_token_lifetime: Duration::hours(1),
			max_pages: 100,
		}
	}
}
