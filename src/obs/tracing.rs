// crates.io
use tracing::{Instrument, Span, instrument::Instrumented};
// self
use crate::{_prelude::*, auth::ProviderKind, obs::FlowKind};

/// A span builder used by engine flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("storefront_sync.flow", flow = kind.as_str(), stage) }
	}

	/// Creates a span that also names the storefront involved.
	pub fn for_provider(kind: FlowKind, stage: &'static str, provider: ProviderKind) -> Self {
		Self {
			span: tracing::info_span!(
				"storefront_sync.flow",
				flow = kind.as_str(),
				stage,
				provider = provider.as_str()
			),
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}
