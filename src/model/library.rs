//! Per-user library entries imported from storefronts.

// self
use crate::{
	_prelude::*,
	auth::{ExternalGameId, ProviderKind, UserId},
	model::CatalogGameId,
	provider::ProviderGameRecord,
};

/// Upsert key for a library entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryKey {
	/// Owning user.
	pub user: UserId,
	/// Storefront the entry was imported from.
	pub provider: ProviderKind,
	/// Storefront-native game identifier.
	pub external_id: ExternalGameId,
}
impl LibraryKey {
	/// Builds a key.
	pub fn new(user: UserId, provider: ProviderKind, external_id: ExternalGameId) -> Self {
		Self { user, provider, external_id }
	}
}

/// Player-declared progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
	/// Not started.
	#[default]
	NotPlayed,
	/// Started but not finished.
	Playing,
	/// Main story finished.
	Completed,
	/// Everything done.
	Mastered,
	/// Gave up.
	Abandoned,
}

/// A user's copy of a catalog game on one storefront.
///
/// Playtime and last-played come from the provider; every other field belongs to the user
/// and survives re-syncs untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLibraryEntry {
	/// Identity.
	pub key: LibraryKey,
	/// Catalog game the entry points at.
	pub game_id: CatalogGameId,
	/// Total playtime in minutes.
	pub playtime_minutes: u64,
	/// Last session start.
	pub last_played_at: Option<OffsetDateTime>,
	/// Installed locally.
	pub installed: bool,
	/// Marked as favorite.
	pub favorite: bool,
	/// Hidden from library views.
	pub hidden: bool,
	/// Progress.
	pub completion: CompletionStatus,
	/// Personal rating, 1 to 10.
	pub rating: Option<u8>,
	/// Free-form notes.
	pub notes: Option<String>,
	/// First import time.
	pub created_at: OffsetDateTime,
	/// Last write time.
	pub updated_at: OffsetDateTime,
}
impl UserLibraryEntry {
	/// Builds a fresh entry from an imported record.
	pub fn imported(
		key: LibraryKey,
		game_id: CatalogGameId,
		record: &ProviderGameRecord,
		now: OffsetDateTime,
	) -> Self {
		Self {
			key,
			game_id,
			playtime_minutes: record.playtime_minutes.unwrap_or_default(),
			last_played_at: record.last_played_at,
			installed: false,
			favorite: false,
			hidden: false,
			completion: CompletionStatus::default(),
			rating: None,
			notes: None,
			created_at: now,
			updated_at: now,
		}
	}

	/// Copies the provider-sourced fields of `incoming` onto `self`.
	///
	/// Returns true when anything changed.
	pub fn refresh_from(&mut self, incoming: &UserLibraryEntry) -> bool {
		let changed = self.playtime_minutes != incoming.playtime_minutes
			|| self.last_played_at != incoming.last_played_at;

		if changed {
			self.playtime_minutes = incoming.playtime_minutes;
			self.last_played_at = incoming.last_played_at;
			self.updated_at = incoming.updated_at;
		}

		changed
	}
}

/// Partial edit of the user-owned fields of a library entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntryUpdate {
	/// New installed flag.
	pub installed: Option<bool>,
	/// New favorite flag.
	pub favorite: Option<bool>,
	/// New hidden flag.
	pub hidden: Option<bool>,
	/// New progress.
	pub completion: Option<CompletionStatus>,
	/// New rating; `Some(None)` clears it.
	pub rating: Option<Option<u8>>,
	/// New notes; `Some(None)` clears them.
	pub notes: Option<Option<String>>,
}
impl LibraryEntryUpdate {
	/// Sets the favorite flag.
	pub fn with_favorite(mut self, favorite: bool) -> Self {
		self.favorite = Some(favorite);

		self
	}

	/// Sets the hidden flag.
	pub fn with_hidden(mut self, hidden: bool) -> Self {
		self.hidden = Some(hidden);

		self
	}

	/// Sets the installed flag.
	pub fn with_installed(mut self, installed: bool) -> Self {
		self.installed = Some(installed);

		self
	}

	/// Sets the completion status.
	pub fn with_completion(mut self, completion: CompletionStatus) -> Self {
		self.completion = Some(completion);

		self
	}

	/// Sets or clears the rating.
	pub fn with_rating(mut self, rating: Option<u8>) -> Self {
		self.rating = Some(rating);

		self
	}

	/// Sets or clears the notes.
	pub fn with_notes(mut self, notes: Option<String>) -> Self {
		self.notes = Some(notes);

		self
	}

	/// Rejects ratings outside 1..=10.
	pub fn validate(&self) -> Result<()> {
		if let Some(Some(rating)) = self.rating
			&& !(1..=10).contains(&rating)
		{
			return Err(Error::InvalidInput {
				field: "rating",
				reason: "must be between 1 and 10".into(),
			});
		}

		Ok(())
	}

	/// Applies the edit and stamps `updated_at`.
	pub fn apply(&self, entry: &mut UserLibraryEntry, now: OffsetDateTime) {
		if let Some(installed) = self.installed {
			entry.installed = installed;
		}
		if let Some(favorite) = self.favorite {
			entry.favorite = favorite;
		}
		if let Some(hidden) = self.hidden {
			entry.hidden = hidden;
		}
		if let Some(completion) = self.completion {
			entry.completion = completion;
		}
		if let Some(rating) = self.rating {
			entry.rating = rating;
		}
		if let Some(notes) = &self.notes {
			entry.notes = notes.clone();
		}

		entry.updated_at = now;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn entry(playtime: u64) -> UserLibraryEntry {
		let key = LibraryKey::new(
			UserId::new("user-1").expect("User fixture should be valid."),
			ProviderKind::Steam,
			ExternalGameId::new("10").expect("Game fixture should be valid."),
		);
		let record = ProviderGameRecord::new("10", "Game A").with_playtime_minutes(playtime);

		UserLibraryEntry::imported(key, CatalogGameId(1), &record, OffsetDateTime::UNIX_EPOCH)
	}

	#[test]
	fn refresh_keeps_user_owned_fields() {
		let mut stored = entry(30);

		LibraryEntryUpdate::default()
			.with_favorite(true)
			.with_completion(CompletionStatus::Completed)
			.with_notes(Some("Great.".into()))
			.apply(&mut stored, OffsetDateTime::UNIX_EPOCH);

		assert!(stored.refresh_from(&entry(95)));
		assert_eq!(stored.playtime_minutes, 95);
		assert!(stored.favorite);
		assert_eq!(stored.completion, CompletionStatus::Completed);
		assert_eq!(stored.notes.as_deref(), Some("Great."));
		assert!(!stored.refresh_from(&entry(95)));
	}

	#[test]
	fn ratings_outside_range_are_rejected() {
		assert!(matches!(
			LibraryEntryUpdate::default().with_rating(Some(11)).validate(),
			Err(Error::InvalidInput { field: "rating", .. })
		));
		assert!(matches!(
			LibraryEntryUpdate::default().with_rating(Some(0)).validate(),
			Err(Error::InvalidInput { field: "rating", .. })
		));
		assert!(LibraryEntryUpdate::default().with_rating(Some(7)).validate().is_ok());
		assert!(LibraryEntryUpdate::default().with_rating(None).validate().is_ok());
	}
}
