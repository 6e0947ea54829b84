// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for library sync runs.
#[derive(Debug, Default)]
pub struct SyncMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	partial: AtomicU64,
	failure: AtomicU64,
	coalesced: AtomicU64,
}
impl SyncMetrics {
	/// Returns the total number of sync triggers.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of runs that imported every game.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of runs that finished with per-item errors or a cut-short listing.
	pub fn partials(&self) -> u64 {
		self.partial.load(Ordering::Relaxed)
	}

	/// Returns the number of runs that aborted.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of triggers folded into a running sync.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_partial(&self) {
		self.partial.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}
}
