// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for Realms calls.
#[derive(Debug, Default)]
pub struct RequestMetrics {
	attempts: AtomicU64,
	unauthorized_retries: AtomicU64,
	transient_retries: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RequestMetrics {
	/// Returns the number of HTTP attempts, retries included.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of retries triggered by a 401.
	pub fn unauthorized_retries(&self) -> u64 {
		self.unauthorized_retries.load(Ordering::Relaxed)
	}

	/// Returns the number of retries triggered by a 502.
	pub fn transient_retries(&self) -> u64 {
		self.transient_retries.load(Ordering::Relaxed)
	}

	/// Returns the number of logical calls that succeeded.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of logical calls that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_unauthorized_retry(&self) {
		self.unauthorized_retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_transient_retry(&self) {
		self.transient_retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
