// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::auth::CredentialKind;

/// Thread-safe counters for chain refreshes.
#[derive(Debug, Default)]
pub struct ChainMetrics {
	sequences: AtomicU64,
	stages: [AtomicU64; 3],
	failures: AtomicU64,
	persist_failures: AtomicU64,
}
impl ChainMetrics {
	/// Returns the number of refresh sequences that completed.
	pub fn sequences(&self) -> u64 {
		self.sequences.load(Ordering::Relaxed)
	}

	/// Returns the number of successful refreshes of `stage`.
	pub fn stage_refreshes(&self, stage: CredentialKind) -> u64 {
		self.stages[stage.index()].load(Ordering::Relaxed)
	}

	/// Returns the number of failed stage refreshes.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of identity saves that failed.
	pub fn persist_failures(&self) -> u64 {
		self.persist_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_sequence(&self) {
		self.sequences.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_stage(&self, stage: CredentialKind) {
		self.stages[stage.index()].fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_persist_failure(&self) {
		self.persist_failures.fetch_add(1, Ordering::Relaxed);
	}
}
