//! Cross-cutting runtime helpers shared by providers and flows.
//!
//! [`Cancellation`] carries a caller's abort signal into every network-bound call, and
//! [`RateLimiter`] enforces a per-provider token bucket that all users of that provider
//! draw from.

pub mod cancel;
pub mod rate_limit;

pub use cancel::*;
pub use rate_limit::*;
