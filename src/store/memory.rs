//! In-memory [`CredentialStore`] for tests and ephemeral deployments.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Keeps the identity credential in-process and counts saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
	slot: RwLock<Option<Credential>>,
	saves: AtomicUsize,
	fail_saves: bool,
}
impl MemoryStore {
	/// Creates a store seeded with `identity`.
	pub fn seeded(identity: Credential) -> Self {
		Self { slot: RwLock::new(Some(identity)), ..Default::default() }
	}

	/// Makes every save fail with a backend error, for exercising persistence failures.
	pub fn failing_saves(mut self) -> Self {
		self.fail_saves = true;

		self
	}

	/// Number of successful saves so far.
	pub fn saves(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	/// Returns the stored identity without going through the async contract.
	pub fn snapshot(&self) -> Option<Credential> {
		self.slot.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		let snapshot = self.snapshot();

		Box::pin(async move { Ok(snapshot) })
	}

	fn save(&self, identity: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			if identity.kind != CredentialKind::Identity {
				return Err(StoreError::UnsupportedKind { kind: identity.kind });
			}
			if self.fail_saves {
				return Err(StoreError::Backend { message: "scripted save failure".into() });
			}

			*self.slot.write() = Some(identity);
			self.saves.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}
