// self
use crate::obs::{OpKind, OpOutcome};

/// Counter incremented once per recorded outcome.
pub const OP_COUNTER: &str = "realms_gateway_op_total";

/// Increments [`OP_COUNTER`] labeled with `op` and `outcome` (when `metrics` is enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(OP_COUNTER, "op" => kind.as_str(), "outcome" => outcome.as_str()).increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}
