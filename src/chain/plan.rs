//! Pure refresh planning: which stages of the chain must be re-issued, and in what order.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
};

/// Validity of one chain slot at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
	/// Holds a credential that stays valid beyond the safety margin.
	Fresh,
	/// Holds a credential that is expired, expiring, or empty.
	Stale,
	/// Holds nothing yet.
	Empty,
}
impl SlotState {
	/// Classifies `slot` at `now` with `margin` to spare.
	pub fn evaluate(slot: Option<&Credential>, now: OffsetDateTime, margin: Duration) -> Self {
		match slot {
			None => Self::Empty,
			Some(credential) if credential.is_valid_at(now, margin) => Self::Fresh,
			Some(_) => Self::Stale,
		}
	}

	/// Returns `true` when the slot must be re-issued.
	pub const fn needs_refresh(self) -> bool {
		!matches!(self, Self::Fresh)
	}
}

/// Ordered set of stages to re-issue.
///
/// Stages are always visited root to leaf, so a parent refreshed by the plan is in place before
/// its child is minted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshPlan {
	stages: [bool; 3],
}
impl RefreshPlan {
	/// Plan that re-issues every stage.
	pub const fn full() -> Self {
		Self { stages: [true; 3] }
	}

	/// Folds per-slot states (indexed by [`CredentialKind::index`]) into a plan.
	///
	/// Each stage is judged on its own slot; a stale identity does not by itself force a still
	/// valid user or service credential to be re-issued.
	pub fn from_states(states: [SlotState; 3]) -> Self {
		Self { stages: states.map(SlotState::needs_refresh) }
	}

	/// Builds the plan for `slots` at `now`; `force` yields [`RefreshPlan::full`].
	pub fn evaluate(
		slots: &[Option<Credential>; 3],
		now: OffsetDateTime,
		margin: Duration,
		force: bool,
	) -> Self {
		if force {
			return Self::full();
		}

		Self::from_states(
			slots.each_ref().map(|slot| SlotState::evaluate(slot.as_ref(), now, margin)),
		)
	}

	/// Returns `true` when `stage` is part of the plan.
	pub const fn includes(&self, stage: CredentialKind) -> bool {
		self.stages[stage.index()]
	}

	/// Returns `true` when nothing needs to be re-issued.
	pub fn is_empty(&self) -> bool {
		!self.stages.iter().any(|stage| *stage)
	}

	/// Iterates the planned stages root to leaf.
	pub fn stages(&self) -> impl Iterator<Item = CredentialKind> + '_ {
		CredentialKind::ORDER.into_iter().filter(|stage| self.includes(*stage))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::credential;

	fn slots(
		identity: Duration,
		user: Option<Duration>,
		service: Option<Duration>,
	) -> [Option<Credential>; 3] {
		[
			Some(credential(CredentialKind::Identity, "identity", identity)),
			user.map(|ttl| credential(CredentialKind::User, "user", ttl)),
			service.map(|ttl| credential(CredentialKind::Service, "service", ttl)),
		]
	}

	#[test]
	fn fresh_chain_plans_nothing() {
		let plan = RefreshPlan::evaluate(
			&slots(Duration::hours(1), Some(Duration::hours(1)), Some(Duration::hours(1))),
			OffsetDateTime::now_utc(),
			Duration::seconds(60),
			false,
		);

		assert!(plan.is_empty());
		assert_eq!(plan.stages().count(), 0);
	}

	#[test]
	fn seed_only_chain_plans_missing_stages_in_order() {
		let plan = RefreshPlan::evaluate(
			&slots(Duration::hours(1), None, None),
			OffsetDateTime::now_utc(),
			Duration::seconds(60),
			false,
		);

		assert_eq!(
			plan.stages().collect::<Vec<_>>(),
			vec![CredentialKind::User, CredentialKind::Service]
		);
	}

	#[test]
	fn expiring_slots_are_stale_and_force_plans_everything() {
		let now = OffsetDateTime::now_utc();
		// `credential` backdates issuance by one minute, so 90 seconds leaves 30 to spare.
		let slots =
			slots(Duration::seconds(90), Some(Duration::hours(1)), Some(Duration::hours(1)));

		assert_eq!(
			SlotState::evaluate(slots[0].as_ref(), now, Duration::seconds(60)),
			SlotState::Stale
		);
		assert_eq!(SlotState::evaluate(None, now, Duration::seconds(60)), SlotState::Empty);
		assert_eq!(
			RefreshPlan::evaluate(&slots, now, Duration::seconds(60), false)
				.stages()
				.collect::<Vec<_>>(),
			vec![CredentialKind::Identity]
		);
		assert_eq!(
			RefreshPlan::evaluate(&slots, now, Duration::seconds(60), true).stages().count(),
			3
		);
	}
}
