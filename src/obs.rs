//! Optional observability helpers for chain refreshes and Realms requests.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `realms_gateway.op` with the `op` (operation
//!   kind) and `stage` (credential stage or request path) fields, plus `debug!`/`warn!` events for
//!   retries and persistence failures.
//! - Enable `metrics` to increment the `realms_gateway_op_total` counter for every
//!   attempt/retry/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// One stage refresh inside the credential chain.
	Refresh,
	/// One logical Realms API call.
	Request,
	/// Persisting the refreshed identity credential.
	Persist,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Refresh => "refresh",
			OpKind::Request => "request",
			OpKind::Persist => "persist",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// The operation is being retried after a recoverable response.
	Retry,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller (or swallowed, for persistence).
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Retry => "retry",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
