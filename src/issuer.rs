//! Credential issuers: the three calls that mint each stage of the chain.

pub mod xbox;

pub use xbox::XboxLiveIssuer;

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	error::AuthRefreshError,
};

/// Boxed future returned by every [`CredentialIssuer`] call.
pub type IssueFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, AuthRefreshError>> + 'a + Send>>;

/// Mints credentials for each chain stage from the stage's parent.
///
/// Implementations perform exactly one remote call per method and never cache; ordering and
/// singleflight are the chain's job.
pub trait CredentialIssuer
where
	Self: Send + Sync,
{
	/// Exchanges the identity credential's refresh token for a new identity credential.
	fn refresh_identity<'a>(&'a self, identity: &'a Credential) -> IssueFuture<'a>;

	/// Mints a user credential from a valid identity credential.
	fn request_user<'a>(&'a self, identity: &'a Credential) -> IssueFuture<'a>;

	/// Mints a service credential from a valid user credential.
	fn request_service<'a>(&'a self, user: &'a Credential) -> IssueFuture<'a>;
}
impl dyn CredentialIssuer {
	/// Dispatches to the call that mints `stage`, feeding it `input`.
	///
	/// For [`CredentialKind::Identity`] the input is the current identity credential; for the
	/// other stages it is the parent credential.
	pub fn issue<'a>(&'a self, stage: CredentialKind, input: &'a Credential) -> IssueFuture<'a> {
		match stage {
			CredentialKind::Identity => self.refresh_identity(input),
			CredentialKind::User => self.request_user(input),
			CredentialKind::Service => self.request_service(input),
		}
	}
}
