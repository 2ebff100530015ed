//! Status-driven retry policy for Realms calls.

// self
use crate::_prelude::*;

/// Retry limits applied to every logical call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Ceiling on attempts for transient (502) failures, counting the first one.
	pub max_attempts: u32,
	/// Fixed delay before each transient retry.
	pub backoff: StdDuration,
}
impl RetryPolicy {
	/// Decides what to do with `status` seen on `attempt` (1-based).
	///
	/// `reauthenticated` records whether this logical call already spent its one forced
	/// refresh on a 401.
	pub fn decide(&self, status: u16, attempt: u32, reauthenticated: bool) -> RetryDecision {
		match status {
			200..=299 => RetryDecision::Accept,
			401 if !reauthenticated => RetryDecision::Reauthenticate,
			502 if attempt < self.max_attempts => RetryDecision::Backoff { delay: self.backoff },
			_ => RetryDecision::Fail,
		}
	}

	/// Overrides the attempt ceiling.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Overrides the backoff delay.
	pub fn with_backoff(mut self, backoff: StdDuration) -> Self {
		self.backoff = backoff;

		self
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 4, backoff: StdDuration::from_secs(1) }
	}
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Parse the body and return it.
	Accept,
	/// Force a credential refresh and retry with the same attempt count.
	Reauthenticate,
	/// Sleep, force a refresh, and retry with the next attempt count.
	Backoff {
		/// Delay before the retry.
		delay: StdDuration,
	},
	/// Surface the response as an API error.
	Fail,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn unauthorized_is_retried_once() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.decide(401, 1, false), RetryDecision::Reauthenticate);
		assert_eq!(policy.decide(401, 1, true), RetryDecision::Fail);
		assert_eq!(policy.decide(401, 3, false), RetryDecision::Reauthenticate);
	}

	#[test]
	fn bad_gateway_backs_off_until_the_fourth_attempt() {
		let policy = RetryPolicy::default();
		let backoff = RetryDecision::Backoff { delay: StdDuration::from_secs(1) };

		assert_eq!(policy.decide(502, 1, false), backoff);
		assert_eq!(policy.decide(502, 3, true), backoff);
		assert_eq!(policy.decide(502, 4, false), RetryDecision::Fail);
	}

	#[test]
	fn other_statuses_pass_or_fail_immediately() {
		let policy = RetryPolicy::default().with_max_attempts(2);

		assert_eq!(policy.decide(204, 1, false), RetryDecision::Accept);
		assert_eq!(policy.decide(403, 1, false), RetryDecision::Fail);
		assert_eq!(policy.decide(503, 1, false), RetryDecision::Fail);
		assert_eq!(policy.decide(502, 2, false), RetryDecision::Fail);
	}
}
