// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing cache traffic.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	lookups: AtomicU64,
	hits: AtomicU64,
	resolutions: AtomicU64,
	failures: AtomicU64,
	shared_failures: AtomicU64,
	evictions: AtomicU64,
}
impl CacheMetrics {
	/// Returns the total number of `get_or_set` calls.
	pub fn lookups(&self) -> u64 {
		self.lookups.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups served from a live entry.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Returns the number of resolver invocations that ran to completion.
	pub fn resolutions(&self) -> u64 {
		self.resolutions.load(Ordering::Relaxed)
	}

	/// Returns the number of resolver invocations that returned an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of waiting callers handed a failure they did not resolve themselves.
	pub fn shared_failures(&self) -> u64 {
		self.shared_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of keys removed by sweeps.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}

	// Returns the lookup count before this call.
	pub(crate) fn record_lookup(&self) -> u64 {
		self.lookups.fetch_add(1, Ordering::Relaxed)
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_resolution(&self, failed: bool) {
		self.resolutions.fetch_add(1, Ordering::Relaxed);

		if failed {
			self.failures.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn record_shared_failure(&self) {
		self.shared_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_evictions(&self, count: usize) {
		self.evictions.fetch_add(count as u64, Ordering::Relaxed);
	}
}
