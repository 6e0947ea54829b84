//! Per-provider token buckets guarding outbound storefront calls.
//!
//! Each registered provider owns exactly one [`RateLimiter`]; every user, sync task, and
//! price refresh that talks to that provider draws permits from the same bucket. A bucket
//! refills continuously at `rate_per_second` up to `burst` permits. A provider-issued
//! `Retry-After` pauses the whole bucket through [`RateLimiter::defer_for`].

// crates.io
use tokio::time::Instant;
// self
use crate::{_prelude::*, auth::ProviderKind, error::ConfigError, ext::Cancellation};

const MAX_BACKOFF_SECS: f64 = 3_600.;

/// Sustained rate and burst size for one provider.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
	/// Permits added per second.
	pub rate_per_second: f64,
	/// Maximum permits that can accumulate.
	pub burst: u32,
}
impl RateLimitSettings {
	/// Creates settings from a sustained rate and a burst size.
	pub const fn new(rate_per_second: f64, burst: u32) -> Self {
		Self { rate_per_second, burst }
	}

	/// Built-in budget for a provider's public API.
	pub const fn default_for(kind: ProviderKind) -> Self {
		match kind {
			ProviderKind::Steam => Self::new(0.6, 5),
			_ => Self::new(1.0, 5),
		}
	}

	/// Rejects budgets that could never issue a permit.
	pub fn validate(&self, kind: ProviderKind) -> Result<(), ConfigError> {
		if !self.rate_per_second.is_finite() || self.rate_per_second <= 0. {
			return Err(ConfigError::invalid_setting(
				format!("rate_limits.{kind}.rate_per_second"),
				"must be a positive number",
			));
		}
		if self.burst == 0 {
			return Err(ConfigError::invalid_setting(
				format!("rate_limits.{kind}.burst"),
				"must be at least 1",
			));
		}

		Ok(())
	}
}

/// Context shared with the limiter before an outbound call is made.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Provider the call targets.
	pub provider: ProviderKind,
	/// Logical operation being attempted.
	pub operation: &'static str,
	/// Instant the limiter observed before deciding.
	pub observed_at: Instant,
}
impl RateLimitContext {
	/// Creates a new context stamped with the current instant.
	pub fn new(provider: ProviderKind, operation: &'static str) -> Self {
		Self { provider, operation, observed_at: Instant::now() }
	}

	/// Overrides the timestamp associated with the observation.
	pub fn with_observed_at(mut self, instant: Instant) -> Self {
		self.observed_at = instant;

		self
	}
}

/// Result of asking a limiter for a permit.
#[derive(Clone, Debug, PartialEq)]
pub enum RateLimitDecision {
	/// A permit was taken; the request may proceed immediately.
	Allow,
	/// No permit is available yet.
	Delay(RetryDirective),
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq)]
pub struct RetryDirective {
	/// Suggested wait before asking again.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided backoff.
	pub fn new(recommended_backoff: Duration) -> Self {
		Self { recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

#[derive(Debug)]
struct BucketState {
	tokens: f64,
	last_refill: Instant,
	blocked_until: Option<Instant>,
}

/// Token bucket shared by every caller of one provider.
#[derive(Debug)]
pub struct RateLimiter {
	provider: ProviderKind,
	settings: RateLimitSettings,
	state: Mutex<BucketState>,
}
impl RateLimiter {
	/// Creates a full bucket for `provider`.
	pub fn new(provider: ProviderKind, settings: RateLimitSettings) -> Self {
		let state = BucketState {
			tokens: f64::from(settings.burst),
			last_refill: Instant::now(),
			blocked_until: None,
		};

		Self { provider, settings, state: Mutex::new(state) }
	}

	/// Provider this bucket guards.
	pub fn provider(&self) -> ProviderKind {
		self.provider
	}

	/// Configured budget.
	pub fn settings(&self) -> RateLimitSettings {
		self.settings
	}

	/// Takes a permit if one is available at `ctx.observed_at`.
	pub fn evaluate(&self, ctx: &RateLimitContext) -> RateLimitDecision {
		let now = ctx.observed_at;
		let mut state = self.state.lock();

		if let Some(until) = state.blocked_until {
			if now < until {
				let wait = until.saturating_duration_since(now).as_secs_f64();

				return RateLimitDecision::Delay(
					RetryDirective::new(Duration::seconds_f64(wait))
						.with_reason("provider asked callers to back off"),
				);
			}

			state.blocked_until = None;
		}

		let capacity = f64::from(self.settings.burst);
		let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();

		state.tokens = (state.tokens + elapsed * self.settings.rate_per_second).min(capacity);
		state.last_refill = now;

		if state.tokens >= 1. {
			state.tokens -= 1.;

			return RateLimitDecision::Allow;
		}

		let wait = ((1. - state.tokens) / self.settings.rate_per_second).min(MAX_BACKOFF_SECS);

		RateLimitDecision::Delay(RetryDirective::new(Duration::seconds_f64(wait)))
	}

	/// Waits for a permit, giving up early if `cancel` fires.
	pub async fn acquire(&self, operation: &'static str, cancel: &Cancellation) -> Result<()> {
		loop {
			cancel.check()?;

			let ctx = RateLimitContext::new(self.provider, operation);
			let directive = match self.evaluate(&ctx) {
				RateLimitDecision::Allow => return Ok(()),
				RateLimitDecision::Delay(directive) => directive,
			};

			tracing::debug!(
				provider = %self.provider,
				operation,
				backoff_ms = directive.recommended_backoff.whole_milliseconds() as u64,
				"Waiting for a rate-limit permit."
			);

			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				_ = tokio::time::sleep(directive.recommended_backoff.unsigned_abs()) => {},
			}
		}
	}

	/// Pauses the bucket for `backoff`, typically from a `Retry-After` header.
	pub fn defer_for(&self, backoff: Duration) {
		if !backoff.is_positive() {
			return;
		}

		let until = Instant::now() + backoff.unsigned_abs();
		let mut state = self.state.lock();

		state.blocked_until = Some(state.blocked_until.map_or(until, |current| current.max(until)));

		tracing::warn!(
			provider = %self.provider,
			backoff_secs = backoff.whole_seconds(),
			"Provider requested a back-off; pausing its rate limiter."
		);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn ctx_at(instant: Instant) -> RateLimitContext {
		RateLimitContext::new(ProviderKind::Steam, "test").with_observed_at(instant)
	}

	#[test]
	fn burst_then_delay_then_refill() {
		let limiter = RateLimiter::new(ProviderKind::Steam, RateLimitSettings::new(2., 3));
		let start = Instant::now();

		for _ in 0..3 {
			assert_eq!(limiter.evaluate(&ctx_at(start)), RateLimitDecision::Allow);
		}

		let RateLimitDecision::Delay(directive) = limiter.evaluate(&ctx_at(start)) else {
			panic!("Fourth permit inside the same instant must be delayed.");
		};

		assert_eq!(directive.recommended_backoff.whole_milliseconds(), 500);
		assert_eq!(
			limiter.evaluate(&ctx_at(start + std::time::Duration::from_millis(500))),
			RateLimitDecision::Allow
		);
	}

	#[test]
	fn refill_never_exceeds_burst() {
		let limiter = RateLimiter::new(ProviderKind::Gog, RateLimitSettings::new(1., 2));
		let later = Instant::now() + std::time::Duration::from_secs(3_600);

		assert_eq!(limiter.evaluate(&ctx_at(later)), RateLimitDecision::Allow);
		assert_eq!(limiter.evaluate(&ctx_at(later)), RateLimitDecision::Allow);
		assert!(matches!(limiter.evaluate(&ctx_at(later)), RateLimitDecision::Delay(_)));
	}

	#[test]
	fn settings_validation_rejects_dead_buckets() {
		assert!(RateLimitSettings::new(0., 5).validate(ProviderKind::Epic).is_err());
		assert!(RateLimitSettings::new(1., 0).validate(ProviderKind::Epic).is_err());
		assert!(
			RateLimitSettings::default_for(ProviderKind::Steam)
				.validate(ProviderKind::Steam)
				.is_ok()
		);
	}

	#[tokio::test(start_paused = true)]
	async fn acquire_waits_for_refill_and_honors_defer() {
		let limiter = RateLimiter::new(ProviderKind::Epic, RateLimitSettings::new(1., 1));
		let cancel = Cancellation::new();
		let start = Instant::now();

		limiter.acquire("first", &cancel).await.expect("First permit should be immediate.");
		limiter
			.acquire("second", &cancel)
			.await
			.expect("Second permit should arrive after refill.");

		assert!(start.elapsed() >= std::time::Duration::from_secs(1));

		limiter.defer_for(Duration::seconds(10));

		let deferred_at = Instant::now();

		limiter.acquire("third", &cancel).await.expect("Third permit should arrive after defer.");

		assert!(deferred_at.elapsed() >= std::time::Duration::from_secs(10));
	}

	#[tokio::test(start_paused = true)]
	async fn acquire_stops_when_cancelled() {
		let limiter = RateLimiter::new(ProviderKind::Epic, RateLimitSettings::new(0.01, 1));
		let cancel = Cancellation::new();

		limiter.acquire("drain", &cancel).await.expect("Initial permit should be immediate.");
		cancel.cancel();

		assert!(matches!(limiter.acquire("blocked", &cancel).await, Err(Error::Cancelled)));
	}
}
