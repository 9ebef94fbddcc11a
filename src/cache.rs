//! Single-flight, expiry-bound cache for exchanged tokens.
//!
//! [`SingleFlightCache::get_or_set`] hands each key a mailbox: an async mutex guarding a single
//! slot. Ownership of the mailbox is ownership of the key, so a caller that finds the slot empty
//! or expired runs its resolver while every other caller for that key queues behind it. Queued
//! callers then observe the resolution's outcome instead of starting a second one, whether it
//! succeeded or failed. Callers arriving after it completed see only what was cached, so failures
//! are retried by the next lookup.
//!
//! Every [`DEFAULT_SWEEP_PERIOD`]th lookup runs [`SingleFlightCache::sweep`], which removes idle
//! keys whose entries have expired. Mailboxes that are currently held are skipped rather than
//! awaited so a sweep never blocks behind a slow identity provider. [`SingleFlightCache::purge`]
//! bumps every mailbox's epoch; a resolution that was in flight across a purge still answers the
//! callers queued on it, but nothing it produced is cached.

mod entry;
mod key;
mod metrics;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use metrics::CacheMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use async_lock::Mutex as AsyncMutex;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
	obs,
};

/// Number of lookups between two housekeeping sweeps.
pub const DEFAULT_SWEEP_PERIOD: u64 = 256;

#[derive(Debug)]
struct Resolution {
	outcome: Result<TokenSecret>,
	// Mailbox epoch the resolution started in.
	epoch: u64,
}

#[derive(Debug, Default)]
struct Slot {
	entry: Option<CacheEntry>,
	// Epoch `entry` was stored in; entries from an older epoch were purged.
	epoch: u64,
	// Outcome of the last completed resolution; only shared with callers that queued on it.
	last: Option<Resolution>,
	// Set once the slot left the key map; holders must look the key up again.
	retired: bool,
}
impl Slot {
	fn live_value(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		self.entry
			.as_ref()
			.filter(|entry| !entry.is_expired_at(now))
			.map(|entry| entry.value.clone())
	}

	fn is_reclaimable(&self, now: OffsetDateTime) -> bool {
		self.entry.as_ref().is_none_or(|entry| entry.is_expired_at(now))
	}
}

#[derive(Clone, Copy, Debug)]
struct Ticket {
	generation: u64,
	epoch: u64,
}

#[derive(Clone, Debug, Default)]
struct Mailbox {
	slot: Arc<AsyncMutex<Slot>>,
	// Bumped by every completed resolution.
	generation: Arc<AtomicU64>,
	// Bumped by every purge.
	epoch: Arc<AtomicU64>,
}
impl Mailbox {
	fn ticket(&self) -> Ticket {
		Ticket {
			generation: self.generation.load(Ordering::Acquire),
			epoch: self.epoch.load(Ordering::Acquire),
		}
	}

	// The outcome of the resolution `ticket` queued on, if one completed since.
	fn queued_outcome(&self, slot: &Slot, ticket: Ticket) -> Option<Result<TokenSecret>> {
		if self.generation.load(Ordering::Acquire) == ticket.generation {
			return None;
		}

		slot.last
			.as_ref()
			.filter(|last| last.epoch == ticket.epoch)
			.map(|last| last.outcome.clone())
	}
}

/// Concurrent key → token cache with per-key single-flight resolution and expiry-based eviction.
///
/// The cache has no size bound and no LRU policy; entries leave only through expiry-driven
/// sweeps or [`purge`](Self::purge). Construct one instance per process (or per data-source
/// owner) and share it behind an [`Arc`].
#[derive(Debug)]
pub struct SingleFlightCache {
	mailboxes: Mutex<HashMap<CacheKey, Mailbox>>,
	sweep_period: u64,
	metrics: CacheMetrics,
}
impl SingleFlightCache {
	/// Creates an empty cache sweeping every [`DEFAULT_SWEEP_PERIOD`] lookups.
	pub fn new() -> Self {
		Self {
			mailboxes: Default::default(),
			sweep_period: DEFAULT_SWEEP_PERIOD,
			metrics: Default::default(),
		}
	}

	/// Overrides how many lookups pass between sweeps (minimum 1).
	pub fn with_sweep_period(mut self, period: u64) -> Self {
		self.sweep_period = period.max(1);

		self
	}

	/// Traffic counters for this cache.
	pub fn metrics(&self) -> &CacheMetrics {
		&self.metrics
	}

	/// Number of keys currently tracked, including empty and expired ones not yet swept.
	pub fn len(&self) -> usize {
		self.mailboxes.lock().len()
	}

	/// Returns `true` when no keys are tracked.
	pub fn is_empty(&self) -> bool {
		self.mailboxes.lock().is_empty()
	}

	/// Returns the live value for `key`, resolving it with `resolve` when missing or expired.
	///
	/// The resolver runs at most once per miss, while the caller owns the key's mailbox; callers
	/// for the same key wait until it finishes and receive its outcome. A resolver error is
	/// returned to this caller and to every caller that was queued on the same resolution, and
	/// the key stays uncached so the next lookup retries. Dropping the returned future releases
	/// the mailbox without touching the slot.
	pub async fn get_or_set<F, Fut>(&self, key: &CacheKey, resolve: F) -> Result<TokenSecret>
	where
		F: FnOnce(CacheKey) -> Fut,
		Fut: Future<Output = Result<AccessToken>>,
	{
		if (self.metrics.record_lookup() + 1) % self.sweep_period == 0 {
			self.sweep();
		}

		let (mut slot, mailbox) = loop {
			let mailbox = self.mailbox(key);
			let ticket = mailbox.ticket();
			let slot = mailbox.slot.lock_arc().await;

			// Checked before `retired`: a sweep or purge may reclaim the slot between the
			// resolver releasing it and this caller acquiring it.
			if let Some(outcome) = mailbox.queued_outcome(&slot, ticket) {
				match &outcome {
					Ok(_) => self.metrics.record_hit(),
					Err(_) => self.metrics.record_shared_failure(),
				}

				return outcome;
			}
			if !slot.retired {
				break (slot, mailbox);
			}
		};
		let epoch = mailbox.epoch.load(Ordering::Acquire);

		if slot.epoch != epoch {
			slot.entry = None;
			slot.epoch = epoch;
		}
		if let Some(value) = slot.live_value(OffsetDateTime::now_utc()) {
			self.metrics.record_hit();

			return Ok(value);
		}

		let outcome = resolve(key.clone()).await.map(CacheEntry::from);

		self.metrics.record_resolution(outcome.is_err());

		let purged = mailbox.epoch.load(Ordering::Acquire) != epoch;

		slot.entry = match &outcome {
			Ok(entry) if !purged => Some(entry.clone()),
			_ => None,
		};

		let outcome = outcome.map(|entry| entry.value);

		slot.last = Some(Resolution { outcome: outcome.clone(), epoch });
		mailbox.generation.fetch_add(1, Ordering::Release);

		outcome
	}

	/// Removes idle keys whose entries are missing or expired; returns how many were removed.
	///
	/// Mailboxes that are held (mid-resolution or serving a hit) are skipped.
	pub fn sweep(&self) -> usize {
		let now = OffsetDateTime::now_utc();
		let mut mailboxes = self.mailboxes.lock();
		let before = mailboxes.len();

		mailboxes.retain(|_, mailbox| match mailbox.slot.try_lock() {
			Some(mut slot) if slot.is_reclaimable(now) => {
				slot.retired = true;

				false
			},
			_ => true,
		});

		let remaining = mailboxes.len();

		drop(mailboxes);

		let evicted = before - remaining;

		self.metrics.record_evictions(evicted);
		obs::record_sweep(evicted, remaining);

		evicted
	}

	/// Invalidates every key so the next lookup for any of them resolves afresh; returns how
	/// many keys were invalidated.
	///
	/// Idle keys are dropped. Keys mid-resolution stay tracked so no second resolver starts for
	/// them; the in-flight result still reaches the callers already queued on it but is not
	/// cached for later lookups.
	pub fn purge(&self) -> usize {
		let mut mailboxes = self.mailboxes.lock();
		let purged = mailboxes.len();

		mailboxes.retain(|_, mailbox| {
			mailbox.epoch.fetch_add(1, Ordering::AcqRel);

			match mailbox.slot.try_lock() {
				Some(mut slot) => {
					slot.retired = true;

					false
				},
				None => true,
			}
		});

		purged
	}

	fn mailbox(&self, key: &CacheKey) -> Mailbox {
		self.mailboxes.lock().entry(key.clone()).or_default().clone()
	}
}
impl Default for SingleFlightCache {
	fn default() -> Self {
		Self::new()
	}
}
