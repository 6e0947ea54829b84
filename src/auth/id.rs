//! Strongly typed identifiers enforced across the engine domain.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (user, external game, region).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (user, external game, region).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (user, external game, region).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
	/// The provider name is not one the engine knows about.
	#[error("Unknown provider `{value}`.")]
	UnknownProvider {
		/// Rejected input.
		value: String,
	},
}

def_id! { UserId, "Already-authenticated user identifier supplied by the caller.", "User" }
def_id! { ExternalGameId, "Provider-native game identifier (Steam app id).", "ExternalGame" }
def_id! { RegionCode, "Storefront region used for price lookups (for example `us`).", "Region" }
impl Default for RegionCode {
	fn default() -> Self {
		Self("us".into())
	}
}

/// Closed set of storefronts the engine can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
	/// Valve's Steam.
	Steam,
	/// Epic Games Store.
	Epic,
	/// GOG.com.
	Gog,
	/// Amazon Games.
	Amazon,
	/// Microsoft Store / Xbox.
	Xbox,
	/// Blizzard Battle.net.
	BattleNet,
	/// Ubisoft Connect.
	Uplay,
	/// EA app.
	Ea,
	/// PlayStation Store.
	Psn,
}
impl ProviderKind {
	/// Every provider kind, in declaration order.
	pub const ALL: [ProviderKind; 9] = [
		ProviderKind::Steam,
		ProviderKind::Epic,
		ProviderKind::Gog,
		ProviderKind::Amazon,
		ProviderKind::Xbox,
		ProviderKind::BattleNet,
		ProviderKind::Uplay,
		ProviderKind::Ea,
		ProviderKind::Psn,
	];

	/// Returns the stable lowercase label used in storage, logs, and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderKind::Steam => "steam",
			ProviderKind::Epic => "epic",
			ProviderKind::Gog => "gog",
			ProviderKind::Amazon => "amazon",
			ProviderKind::Xbox => "xbox",
			ProviderKind::BattleNet => "battlenet",
			ProviderKind::Uplay => "uplay",
			ProviderKind::Ea => "ea",
			ProviderKind::Psn => "psn",
		}
	}
}
impl Display for ProviderKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ProviderKind {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lowered = s.trim().to_ascii_lowercase();

		Self::ALL
			.into_iter()
			.find(|kind| kind.as_str() == lowered)
			.ok_or(IdentifierError::UnknownProvider { value: s.to_owned() })
	}
}
impl TryFrom<String> for ProviderKind {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
impl From<ProviderKind> for String {
	fn from(value: ProviderKind) -> Self {
		value.as_str().to_owned()
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_blank_and_padded_values() {
		assert!(UserId::new(" user-123").is_err(), "Leading whitespace must be rejected.");
		assert!(ExternalGameId::new("").is_err(), "Empty game ids must be rejected.");

		let user = UserId::new("user-123").expect("User fixture should be considered valid.");

		assert_eq!(user.as_ref(), "user-123");
		assert!(RegionCode::new("u s").is_err());
		assert!(ExternalGameId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let id: ExternalGameId =
			serde_json::from_str("\"570\"").expect("Game id should deserialize successfully.");

		assert_eq!(id.as_ref(), "570");
		assert!(serde_json::from_str::<ExternalGameId>("\"with space\"").is_err());
	}

	#[test]
	fn provider_kind_parses_case_insensitively() {
		assert_eq!("Steam".parse::<ProviderKind>(), Ok(ProviderKind::Steam));
		assert_eq!("battlenet".parse::<ProviderKind>(), Ok(ProviderKind::BattleNet));
		assert!(matches!(
			"itch".parse::<ProviderKind>(),
			Err(IdentifierError::UnknownProvider { .. })
		));

		let encoded =
			serde_json::to_string(&ProviderKind::Gog).expect("Provider kind should serialize.");

		assert_eq!(encoded, "\"gog\"");
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ExternalGameId, u8> = HashMap::from_iter([(
			ExternalGameId::new("10").expect("Game id used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("10"), Some(&7));
	}
}
