//! Shared helpers for flow implementations (sync state board, singleflight guards).

// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{_prelude::*, ext::Cancellation, model::AccountKey};

/// Phase of a library sync for one `(user, provider)` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
	/// No sync has run since the engine started or the account was unlinked.
	#[default]
	Idle,
	/// Waiting on the provider (token refresh, owned-games listing).
	Fetching,
	/// Mapping records onto catalog listings.
	Reconciling,
	/// Writing library rows and price observations.
	Persisting,
	/// Last run finished, possibly with per-item errors.
	Done,
	/// Last run aborted.
	Failed,
}
impl SyncPhase {
	/// Returns true while a run holds the pair.
	pub const fn is_running(self) -> bool {
		matches!(self, SyncPhase::Fetching | SyncPhase::Reconciling | SyncPhase::Persisting)
	}
}

#[derive(Debug, Default)]
struct SyncSlot {
	phase: SyncPhase,
	cancel: Option<Cancellation>,
	forget_on_release: bool,
}

/// In-flight board enforcing one running sync per `(user, provider)` pair.
#[derive(Clone, Debug, Default)]
pub(crate) struct SyncTracker(Arc<Mutex<HashMap<AccountKey, SyncSlot>>>);
impl SyncTracker {
	/// Claims the pair, or returns `None` when a run already holds it.
	pub(crate) fn try_begin(&self, key: &AccountKey, cancel: Cancellation) -> Option<SyncRun> {
		let mut slots = self.0.lock();
		let slot = slots.entry(key.clone()).or_default();

		if slot.cancel.is_some() {
			return None;
		}

		slot.phase = SyncPhase::Fetching;
		slot.cancel = Some(cancel);

		Some(SyncRun { tracker: self.clone(), key: key.clone(), finished: false })
	}

	pub(crate) fn phase(&self, key: &AccountKey) -> SyncPhase {
		self.0.lock().get(key).map(|slot| slot.phase).unwrap_or_default()
	}

	/// Cancels any running sync and drops the pair from the board once it is released.
	pub(crate) fn forget(&self, key: &AccountKey) -> bool {
		let mut slots = self.0.lock();
		let Some(slot) = slots.get_mut(key) else {
			return false;
		};

		if let Some(cancel) = &slot.cancel {
			cancel.cancel();

			slot.forget_on_release = true;

			return true;
		}

		slots.remove(key);

		false
	}

	fn set(&self, key: &AccountKey, phase: SyncPhase, release: bool) {
		let mut slots = self.0.lock();
		let Some(slot) = slots.get_mut(key) else {
			return;
		};

		if release && slot.forget_on_release {
			slots.remove(key);

			return;
		}

		slot.phase = phase;

		if release {
			slot.cancel = None;
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.0.lock().len()
	}
}

/// Claim on a `(user, provider)` pair; dropping it unfinished marks the run failed.
#[derive(Debug)]
pub(crate) struct SyncRun {
	tracker: SyncTracker,
	key: AccountKey,
	finished: bool,
}
impl SyncRun {
	pub(crate) fn advance(&self, phase: SyncPhase) {
		self.tracker.set(&self.key, phase, false);
	}

	pub(crate) fn finish(mut self, phase: SyncPhase) {
		self.finished = true;
		self.tracker.set(&self.key, phase, true);
	}
}
impl Drop for SyncRun {
	fn drop(&mut self) {
		if !self.finished {
			self.tracker.set(&self.key, SyncPhase::Failed, true);
		}
	}
}

/// Per-key async locks used to coalesce duplicate provider calls.
///
/// An entry lives only while some task holds or waits for its lock.
#[derive(Debug)]
pub(crate) struct KeyedGuards<K>(Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>);
impl<K> KeyedGuards<K>
where
	K: Clone + Eq + Hash,
{
	/// Waits for exclusive access to `key`.
	pub(crate) async fn lock(&self, key: &K) -> KeyedGuard<K> {
		// Declared before the mutex so a dropped waiter still prunes after its clone is gone.
		let mut guard = KeyedGuard { guards: self.clone(), key: key.clone(), held: None };
		let mutex = self
			.0
			.lock()
			.entry(key.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		guard.held = Some(mutex.lock_arc().await);

		guard
	}

	fn prune(&self, key: &K) {
		let mut guards = self.0.lock();

		// Waiters clone the mutex under this lock, so a count of one means nobody else needs it.
		if guards.get(key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
			guards.remove(key);
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.0.lock().len()
	}
}
impl<K> Clone for KeyedGuards<K> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}
impl<K> Default for KeyedGuards<K> {
	fn default() -> Self {
		Self(Default::default())
	}
}

/// Held lock on one key of a [`KeyedGuards`] map.
pub(crate) struct KeyedGuard<K>
where
	K: Clone + Eq + Hash,
{
	guards: KeyedGuards<K>,
	key: K,
	held: Option<MutexGuardArc<()>>,
}
impl<K> Drop for KeyedGuard<K>
where
	K: Clone + Eq + Hash,
{
	fn drop(&mut self) {
		// The held guard owns a clone of the mutex; release it before counting.
		drop(self.held.take());

		self.guards.prune(&self.key);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{ProviderKind, UserId};

	fn key() -> AccountKey {
		let user = UserId::new("user-1").expect("User fixture should be valid.");

		AccountKey::new(user, ProviderKind::Gog)
	}

	#[test]
	fn second_claim_is_refused_until_release() {
		let tracker = SyncTracker::default();
		let run = tracker.try_begin(&key(), Cancellation::new()).expect("First claim should win.");

		assert!(tracker.try_begin(&key(), Cancellation::new()).is_none());
		assert_eq!(tracker.phase(&key()), SyncPhase::Fetching);

		run.advance(SyncPhase::Persisting);

		assert!(tracker.phase(&key()).is_running());

		run.finish(SyncPhase::Done);

		assert_eq!(tracker.phase(&key()), SyncPhase::Done);
		assert!(tracker.try_begin(&key(), Cancellation::new()).is_some());
	}

	#[test]
	fn dropped_runs_fail_and_release_the_pair() {
		let tracker = SyncTracker::default();
		let cancel = Cancellation::new();
		let run = tracker.try_begin(&key(), cancel.clone()).expect("Claim should succeed.");

		assert!(tracker.try_begin(&key(), Cancellation::new()).is_none());

		drop(run);

		assert_eq!(tracker.phase(&key()), SyncPhase::Failed);
		assert!(!cancel.is_cancelled());
		assert!(tracker.try_begin(&key(), Cancellation::new()).is_some());
	}

	#[test]
	fn forgotten_pairs_leave_the_board() {
		let tracker = SyncTracker::default();

		tracker.try_begin(&key(), Cancellation::new()).expect("Claim should succeed.").finish(
			SyncPhase::Done,
		);

		assert_eq!(tracker.len(), 1);
		assert!(!tracker.forget(&key()));
		assert_eq!(tracker.len(), 0);
		assert_eq!(tracker.phase(&key()), SyncPhase::Idle);

		let cancel = Cancellation::new();
		let run = tracker.try_begin(&key(), cancel.clone()).expect("Claim should succeed.");

		assert!(tracker.forget(&key()));
		assert!(cancel.is_cancelled());
		assert_eq!(tracker.len(), 1);

		drop(run);

		assert_eq!(tracker.len(), 0);
	}

	#[tokio::test]
	async fn keyed_guards_drop_entries_with_their_last_holder() {
		let guards = KeyedGuards::<u32>::default();
		let first = guards.lock(&1).await;
		let other = guards.lock(&2).await;

		assert_eq!(guards.len(), 2);

		drop(other);

		assert_eq!(guards.len(), 1);

		let waiter = {
			let guards = guards.clone();

			tokio::spawn(async move {
				let _held = guards.lock(&1).await;
			})
		};

		tokio::task::yield_now().await;
		drop(first);

		assert_eq!(guards.len(), 1);

		waiter.await.expect("Waiter should finish.");

		assert_eq!(guards.len(), 0);

		let holder = guards.lock(&3).await;
		let abandoned = {
			let guards = guards.clone();

			tokio::spawn(async move {
				let _held = guards.lock(&3).await;
			})
		};

		tokio::task::yield_now().await;
		abandoned.abort();

		assert!(abandoned.await.is_err());

		drop(holder);

		assert_eq!(guards.len(), 0);
	}
}
