// self
use crate::{
	_prelude::*,
	auth::ProviderKind,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderEndpoints, ProviderQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required to link accounts.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Account endpoint is required for profile and library calls.
	#[error("Missing account endpoint.")]
	MissingAccountEndpoint,
	/// Refresh support implies a token endpoint.
	#[error("The `refresh_supported` quirk requires a token endpoint.")]
	RefreshWithoutTokenEndpoint,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// Pagination cap must allow at least one page.
	#[error("The `max_pages` quirk must be at least 1.")]
	InvalidPageLimit,
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Storefront being described.
	pub kind: ProviderKind,
	/// Login page.
	pub authorization_endpoint: Option<Url>,
	/// OAuth token endpoint.
	pub token_endpoint: Option<Url>,
	/// Account/profile API base.
	pub account_endpoint: Option<Url>,
	/// Owned-games API base, when it differs from the account base.
	pub library_endpoint: Option<Url>,
	/// Search API base.
	pub search_endpoint: Option<Url>,
	/// Price API base.
	pub pricing_endpoint: Option<Url>,
	/// Preferred client authentication method for the token endpoint.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided storefront.
	pub fn new(kind: ProviderKind) -> Self {
		Self {
			kind,
			authorization_endpoint: None,
			token_endpoint: None,
			account_endpoint: None,
			library_endpoint: None,
			search_endpoint: None,
			pricing_endpoint: None,
			preferred_client_auth_method: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the account API base.
	pub fn account_endpoint(mut self, url: Url) -> Self {
		self.account_endpoint = Some(url);

		self
	}

	/// Sets a dedicated owned-games API base.
	pub fn library_endpoint(mut self, url: Url) -> Self {
		self.library_endpoint = Some(url);

		self
	}

	/// Sets the search API base.
	pub fn search_endpoint(mut self, url: Url) -> Self {
		self.search_endpoint = Some(url);

		self
	}

	/// Sets the price API base.
	pub fn pricing_endpoint(mut self, url: Url) -> Self {
		self.pricing_endpoint = Some(url);

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let account =
			self.account_endpoint.ok_or(ProviderDescriptorError::MissingAccountEndpoint)?;
		let endpoints = ProviderEndpoints {
			authorization,
			token: self.token_endpoint,
			account,
			library: self.library_endpoint,
			search: self.search_endpoint,
			pricing: self.pricing_endpoint,
		};
		let descriptor = ProviderDescriptor {
			kind: self.kind,
			endpoints,
			preferred_client_auth_method: self.preferred_client_auth_method,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	pub fn validate(&self) -> Result<(), ProviderDescriptorError> {
		if self.quirks.refresh_supported && self.endpoints.token.is_none() {
			return Err(ProviderDescriptorError::RefreshWithoutTokenEndpoint);
		}
		if self.quirks.max_pages == 0 {
			return Err(ProviderDescriptorError::InvalidPageLimit);
		}

		let endpoints = &self.endpoints;

		validate_endpoint("authorization", &endpoints.authorization)?;
		validate_endpoint("account", &endpoints.account)?;

		for (name, url) in [
			("token", &endpoints.token),
			("library", &endpoints.library),
			("search", &endpoints.search),
			("pricing", &endpoints.pricing),
		] {
			if let Some(url) = url {
				validate_endpoint(name, url)?;
			}
		}

		validate_scope_delimiter(self.quirks.scope_delimiter)?;

		Ok(())
	}
}

// Plain HTTP is tolerated for loopback hosts so local mocks and sidecars work.
fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn validate_scope_delimiter(delimiter: char) -> Result<(), ProviderDescriptorError> {
	if delimiter.is_control() {
		Err(ProviderDescriptorError::InvalidScopeDelimiter { delimiter })
	} else {
		Ok(())
	}
}
