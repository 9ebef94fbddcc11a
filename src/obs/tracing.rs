// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used around token acquisitions.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("adx_token_broker.acquire", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs which strategy serves the current request.
pub fn record_strategy(kind: FlowKind) {
	#[cfg(feature = "tracing")]
	tracing::debug!(flow = kind.as_str(), "Selected token acquisition strategy.");

	#[cfg(not(feature = "tracing"))]
	let _ = kind;
}

/// Logs a failed on-behalf-of exchange with full detail. Never pass token material here.
pub fn record_exchange_failure(login: &str, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::error!(login, error = %error, detail = ?error, "On-behalf-of token exchange failed.");

	#[cfg(not(feature = "tracing"))]
	let _ = (login, error);
}

/// Logs the result of a housekeeping sweep.
pub fn record_sweep(evicted: usize, remaining: usize) {
	#[cfg(feature = "tracing")]
	tracing::trace!(evicted, remaining, "Swept expired token cache entries.");

	#[cfg(not(feature = "tracing"))]
	let _ = (evicted, remaining);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn log_helpers_accept_any_subscriber_state() {
		record_strategy(FlowKind::ServiceIdentity);
		record_exchange_failure("alice", &Error::TimedOut);
		record_sweep(0, 0);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::OnBehalfOf, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
