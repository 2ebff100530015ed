//! Persistence hook for the identity credential, the only stage that outlives the process.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by [`CredentialStore`] calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage contract for the seed identity credential.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Loads the persisted identity credential, if any.
	fn load(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Persists or replaces the identity credential.
	fn save(&self, identity: Credential) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Only identity credentials are persisted.
	#[error("Refusing to persist a {kind} credential.")]
	UnsupportedKind {
		/// Kind that was offered.
		kind: crate::auth::CredentialKind,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let gateway_error: Error = store_error.clone().into();

		assert!(matches!(gateway_error, Error::Storage(_)));
		assert!(gateway_error.to_string().contains("disk unavailable"));

		let source = StdError::source(&gateway_error)
			.expect("Gateway error should expose the store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
