//! Observability helpers for orchestrated flows.
//!
//! Every flow runs inside a `tracing` span named `storefront_sync.flow` carrying the `flow`
//! kind and the `stage` (call site). With the `metrics` feature enabled, each attempt and
//! its terminal outcome increment the `storefront_sync_flow_total` counter labelled by
//! `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Orchestrated flows observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Account linking (code exchange + profile lookup).
	Connect,
	/// Owned-games import for one `(user, provider)` pair.
	LibrarySync,
	/// Refresh-token grant issued on behalf of a stored account.
	TokenRefresh,
	/// Price lookup through the TTL gate.
	PriceRefresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Connect => "connect",
			FlowKind::LibrarySync => "library_sync",
			FlowKind::TokenRefresh => "token_refresh",
			FlowKind::PriceRefresh => "price_refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Completion with per-item failures or a truncated listing.
	Partial,
	/// Failure propagated back to the caller.
	Failure,
	/// Trigger folded into an already running flow.
	Coalesced,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Partial => "partial",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Coalesced => "coalesced",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
