//! Three-stage credential chain with ordered, singleflight refreshes.
//!
//! [`TokenChain`] owns one slot per [`CredentialKind`]. [`TokenChain::ensure_valid`] folds the
//! slots into a [`RefreshPlan`] and re-issues the planned stages root to leaf under a single
//! async guard, so concurrent callers share one Identity -> User -> Service sequence. A
//! generation counter lets callers that queued behind a forced refresh reuse its result
//! instead of forcing another one. Refreshed identity credentials are handed to the
//! [`CredentialStore`]; a failed save is logged and counted but never fails the call. Each
//! issuer call is bounded by [`ChainConfig::refresh_timeout`], so a stalled token service
//! releases the guard with a timeout error.

mod metrics;
mod plan;

pub use metrics::ChainMetrics;
pub use plan::{RefreshPlan, SlotState};

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	config::ChainConfig,
	error::{AuthRefreshError, ConfigError, TransportError},
	issuer::CredentialIssuer,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::CredentialStore,
};

#[derive(Debug)]
struct ChainState {
	slots: [Option<Credential>; 3],
	generation: u64,
}

/// Owner of the Identity, User, and Service credentials.
pub struct TokenChain {
	issuer: Arc<dyn CredentialIssuer>,
	store: Arc<dyn CredentialStore>,
	config: ChainConfig,
	state: RwLock<ChainState>,
	guard: AsyncMutex<()>,
	metrics: ChainMetrics,
}
impl TokenChain {
	/// Creates a chain seeded with a persisted identity credential.
	pub fn new(
		issuer: Arc<dyn CredentialIssuer>,
		store: Arc<dyn CredentialStore>,
		seed: Credential,
		config: ChainConfig,
	) -> Result<Self, ConfigError> {
		if seed.kind != CredentialKind::Identity {
			return Err(ConfigError::InvalidSetting {
				name: "seed",
				reason: format!("expected an identity credential, got {}", seed.kind),
			});
		}

		Ok(Self {
			issuer,
			store,
			config,
			state: RwLock::new(ChainState { slots: [Some(seed), None, None], generation: 0 }),
			guard: AsyncMutex::new(()),
			metrics: ChainMetrics::default(),
		})
	}

	/// Creates a chain seeded from whatever `store` currently holds.
	pub async fn from_store(
		issuer: Arc<dyn CredentialIssuer>,
		store: Arc<dyn CredentialStore>,
		config: ChainConfig,
	) -> Result<Self> {
		let seed = store.load().await?.ok_or(ConfigError::MissingSeed)?;

		Ok(Self::new(issuer, store, seed, config)?)
	}

	/// Returns a copy of the credential held for `kind`.
	pub fn current(&self, kind: CredentialKind) -> Option<Credential> {
		self.state.read().slots[kind.index()].clone()
	}

	/// Number of refresh sequences that completed successfully.
	pub fn generation(&self) -> u64 {
		self.state.read().generation
	}

	/// Counters for this chain.
	pub fn metrics(&self) -> &ChainMetrics {
		&self.metrics
	}

	/// Safety margin used for every validity check.
	pub fn safety_margin(&self) -> Duration {
		self.config.safety_margin
	}

	/// Plans the stages that would be re-issued right now.
	pub fn plan(&self, force: bool) -> RefreshPlan {
		RefreshPlan::evaluate(
			&self.state.read().slots,
			OffsetDateTime::now_utc(),
			self.config.safety_margin,
			force,
		)
	}

	/// Returns a valid service credential, refreshing whatever stages need it.
	///
	/// With `force`, every stage is re-issued unless another caller completed a refresh
	/// sequence while this one waited for the guard.
	pub async fn ensure_valid(&self, force: bool) -> Result<Credential> {
		let observed = self.generation();

		let reusable = if force { None } else { self.fresh_service() };

		if let Some(service) = reusable {
			return Ok(service);
		}

		let _singleflight = self.guard.lock().await;
		let force = force && self.generation() == observed;
		let plan = self.plan(force);

		if let Some(service) = self.current(CredentialKind::Service).filter(|_| plan.is_empty()) {
			return Ok(service);
		}

		self.run(plan).await
	}

	fn fresh_service(&self) -> Option<Credential> {
		if !self.plan(false).is_empty() {
			return None;
		}

		self.current(CredentialKind::Service)
	}

	async fn run(&self, plan: RefreshPlan) -> Result<Credential> {
		for stage in plan.stages() {
			let input = self.stage_input(stage)?;
			let span = OpSpan::new(OpKind::Refresh, stage.as_str());

			obs::record_op_outcome(OpKind::Refresh, OpOutcome::Attempt);

			let after = self.config.refresh_timeout;
			let outcome = span
				.instrument(tokio::time::timeout(after, self.issuer.issue(stage, &input)))
				.await
				.unwrap_or_else(|_| {
					Err(AuthRefreshError::Transport {
						stage,
						source: TransportError::Timeout { after },
					})
				});
			let mut issued = match outcome {
				Ok(issued) => issued,
				Err(err) => {
					self.metrics.record_failure();
					obs::record_op_outcome(OpKind::Refresh, OpOutcome::Failure);
					obs::warn_event(OpKind::Refresh, format_args!("{stage} refresh failed: {err}"));

					return Err(err.into());
				},
			};

			issued.kind = stage;
			self.state.write().slots[stage.index()] = Some(issued.clone());
			self.metrics.record_stage(stage);
			obs::record_op_outcome(OpKind::Refresh, OpOutcome::Success);
			obs::debug_event(OpKind::Refresh, format_args!("{stage} credential refreshed"));

			if stage == CredentialKind::Identity {
				self.persist(issued).await;
			}
		}

		let mut state = self.state.write();

		state.generation += 1;
		self.metrics.record_sequence();

		state.slots[CredentialKind::Service.index()]
			.clone()
			.ok_or_else(|| AuthRefreshError::ParentInvalid { stage: CredentialKind::Service }.into())
	}

	// Identity refreshes from itself; every other stage needs a valid parent.
	fn stage_input(&self, stage: CredentialKind) -> Result<Credential, AuthRefreshError> {
		let state = self.state.read();

		match stage.parent() {
			None => state.slots[stage.index()].clone().ok_or(AuthRefreshError::MissingRefreshToken),
			Some(parent) => state.slots[parent.index()]
				.as_ref()
				.filter(|credential| {
					credential.is_valid_at(OffsetDateTime::now_utc(), self.config.safety_margin)
				})
				.cloned()
				.ok_or(AuthRefreshError::ParentInvalid { stage }),
		}
	}

	async fn persist(&self, identity: Credential) {
		let span = OpSpan::new(OpKind::Persist, CredentialKind::Identity.as_str());

		match span.instrument(self.store.save(identity)).await {
			Ok(()) => obs::record_op_outcome(OpKind::Persist, OpOutcome::Success),
			Err(err) => {
				self.metrics.record_persist_failure();
				obs::record_op_outcome(OpKind::Persist, OpOutcome::Failure);
				obs::warn_event(
					OpKind::Persist,
					format_args!("refreshed identity could not be saved: {err}"),
				);
			},
		}
	}
}
impl Debug for TokenChain {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("TokenChain")
			.field("slots", &state.slots)
			.field("generation", &state.generation)
			.field("safety_margin", &self.config.safety_margin)
			.finish()
	}
}
