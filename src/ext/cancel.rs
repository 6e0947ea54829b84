//! Cooperative cancellation shared between a caller and the task it started.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::sync::Notify;
// self
use crate::_prelude::*;

/// Clonable abort signal; every clone observes the same state.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<CancellationState>);
#[derive(Debug, Default)]
struct CancellationState {
	cancelled: AtomicBool,
	notify: Notify,
}
impl Cancellation {
	/// Creates a signal that has not fired yet.
	pub fn new() -> Self {
		Self::default()
	}

	/// Fires the signal and wakes every waiter. Idempotent.
	pub fn cancel(&self) {
		if !self.0.cancelled.swap(true, Ordering::AcqRel) {
			self.0.notify.notify_waiters();
		}
	}

	/// Returns true once [`Cancellation::cancel`] has been called.
	pub fn is_cancelled(&self) -> bool {
		self.0.cancelled.load(Ordering::Acquire)
	}

	/// Fails with [`Error::Cancelled`] when the signal has fired.
	pub fn check(&self) -> Result<()> {
		if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
	}

	/// Resolves once the signal fires.
	pub async fn cancelled(&self) {
		loop {
			// Register before checking the flag so a concurrent `cancel` cannot be missed.
			let notified = self.0.notify.notified();

			if self.is_cancelled() {
				return;
			}

			notified.await;
		}
	}

	/// Runs `fut` unless the signal fires first.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		tokio::select! {
			biased;
			_ = self.cancelled() => Err(Error::Cancelled),
			result = fut => result,
		}
	}
}
