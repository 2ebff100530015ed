//! File-backed [`CredentialStore`] using the OAuth token response JSON layout.
//!
//! The file holds one object with `token_type`, `expires_in`, `scope`, `access_token`,
//! `refresh_token`, `user_id`, and `issued` (RFC 3339). Fields the chain does not track
//! (`token_type`, `scope`, `user_id`) are carried over unchanged on every save.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Persists the identity credential to a JSON file after each save.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<PersistedIdentity>>>,
}
impl FileStore {
	/// Opens (or prepares) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Option<PersistedIdentity>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		let persisted = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})?;

		Ok(Some(persisted))
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, persisted: &PersistedIdentity) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(persisted).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize identity credential: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move {
			let guard = self.inner.read();

			guard.as_ref().map(PersistedIdentity::to_credential).transpose()
		})
	}

	fn save(&self, identity: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			if identity.kind != CredentialKind::Identity {
				return Err(StoreError::UnsupportedKind { kind: identity.kind });
			}

			let mut guard = self.inner.write();
			let persisted = PersistedIdentity::from_credential(&identity, guard.as_ref());

			self.persist(&persisted)?;
			*guard = Some(persisted);

			Ok(())
		})
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedIdentity {
	token_type: String,
	expires_in: i64,
	#[serde(default)]
	scope: String,
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	user_id: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	issued: OffsetDateTime,
}
impl PersistedIdentity {
	fn to_credential(&self) -> Result<Credential, StoreError> {
		let mut builder = Credential::builder(CredentialKind::Identity)
			.value(self.access_token.clone())
			.issued_at(self.issued)
			.expires_in(Duration::seconds(self.expires_in));

		if let Some(refresh_token) = &self.refresh_token {
			builder = builder.refresh_token(refresh_token.clone());
		}

		builder.build().map_err(|e| StoreError::Serialization { message: e.to_string() })
	}

	fn from_credential(identity: &Credential, previous: Option<&Self>) -> Self {
		Self {
			token_type: previous.map_or_else(|| "bearer".into(), |p| p.token_type.clone()),
			expires_in: (identity.expires_at - identity.issued_at).whole_seconds(),
			scope: previous.map(|p| p.scope.clone()).unwrap_or_default(),
			access_token: identity.value.expose().to_owned(),
			refresh_token: identity.refresh_token.as_ref().map(|token| token.expose().to_owned()),
			user_id: previous.and_then(|p| p.user_id.clone()),
			issued: identity.issued_at,
		}
	}
}
