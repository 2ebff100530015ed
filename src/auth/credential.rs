//! Credential records, the chain's stage ordering, and lifecycle helpers.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Stage of the credential chain, ordered from root to leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	/// OAuth 2.0 access token issued by the identity provider; the only persisted stage.
	Identity,
	/// Delegated user token minted from the identity access token.
	User,
	/// Service (XSTS) token minted from the user token for one relying party.
	Service,
}
impl CredentialKind {
	/// Every stage in dependency order.
	pub const ORDER: [CredentialKind; 3] = [Self::Identity, Self::User, Self::Service];

	/// Returns the stage this one is minted from.
	pub const fn parent(self) -> Option<CredentialKind> {
		match self {
			Self::Identity => None,
			Self::User => Some(Self::Identity),
			Self::Service => Some(Self::User),
		}
	}

	/// Position of the stage inside [`CredentialKind::ORDER`].
	pub const fn index(self) -> usize {
		match self {
			Self::Identity => 0,
			Self::User => 1,
			Self::Service => 2,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Identity => "identity",
			Self::User => "user",
			Self::Service => "service",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Current lifecycle status for a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Issued-at lies in the future.
	Pending,
	/// Valid beyond the safety margin.
	Active,
	/// Still valid, but inside the safety margin; treated as invalid by the chain.
	Expiring,
	/// Past its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no token value was provided.
	#[error("Credential value is required.")]
	MissingValue,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// One short-lived credential of the chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Chain stage this credential belongs to.
	pub kind: CredentialKind,
	/// Bearer material; callers must avoid logging it.
	pub value: TokenSecret,
	/// OAuth refresh token, carried by the identity stage.
	pub refresh_token: Option<TokenSecret>,
	/// User hash claim (`uhs`) needed to build XBL authorization headers.
	pub user_hash: Option<String>,
	/// Xbox user id claim (`xid`) exposed by the service stage.
	pub xuid: Option<String>,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Creates a credential with the required fields only.
	pub fn new(
		kind: CredentialKind,
		value: impl Into<TokenSecret>,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self {
			kind,
			value: value.into(),
			refresh_token: None,
			user_hash: None,
			xuid: None,
			issued_at,
			expires_at,
		}
	}

	/// Returns a builder for a credential of `kind`.
	pub fn builder(kind: CredentialKind) -> CredentialBuilder {
		CredentialBuilder::new(kind)
	}

	/// Computes the lifecycle status at `instant`, treating the last `margin` before expiry as
	/// [`CredentialStatus::Expiring`].
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> CredentialStatus {
		if instant < self.issued_at {
			return CredentialStatus::Pending;
		}
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if instant + margin >= self.expires_at {
			return CredentialStatus::Expiring;
		}

		CredentialStatus::Active
	}

	/// Returns `true` when the credential can be used at `instant` with `margin` to spare.
	///
	/// A credential whose issued-at lies slightly in the future (clock skew) still counts as
	/// usable.
	pub fn is_valid_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		!self.value.is_empty()
			&& matches!(
				self.status_at(instant, margin),
				CredentialStatus::Active | CredentialStatus::Pending
			)
	}

	/// Convenience helper that checks validity against the current UTC instant.
	pub fn is_valid(&self, margin: Duration) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc(), margin)
	}

	/// Time left before expiry at `instant`, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Formats the value for the `Authorization` header.
	///
	/// Service credentials carrying a user hash use the `XBL3.0 x={uhs};{token}` scheme; anything
	/// else falls back to a bearer header.
	pub fn authorization_header_value(&self) -> String {
		match &self.user_hash {
			Some(uhs) => format!("XBL3.0 x={uhs};{}", self.value.expose()),
			None => format!("Bearer {}", self.value.expose()),
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("kind", &self.kind)
			.field("value", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("user_hash", &self.user_hash)
			.field("xuid", &self.xuid)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	kind: CredentialKind,
	value: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	user_hash: Option<String>,
	xuid: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(kind: CredentialKind) -> Self {
		Self {
			kind,
			value: None,
			refresh_token: None,
			user_hash: None,
			xuid: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the token value.
	pub fn value(mut self, value: impl Into<TokenSecret>) -> Self {
		self.value = Some(value.into());

		self
	}

	/// Sets the refresh token.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the user hash claim.
	pub fn user_hash(mut self, uhs: impl Into<String>) -> Self {
		self.user_hash = Some(uhs.into());

		self
	}

	/// Sets the Xbox user id claim.
	pub fn xuid(mut self, xuid: impl Into<String>) -> Self {
		self.xuid = Some(xuid.into());

		self
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets the absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the lifetime relative to issued-at.
	pub fn expires_in(mut self, lifetime: Duration) -> Self {
		self.expires_in = Some(lifetime);

		self
	}

	/// Validates the inputs and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let value = self.value.ok_or(CredentialBuilderError::MissingValue)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(Credential {
			kind: self.kind,
			value,
			refresh_token: self.refresh_token,
			user_hash: self.user_hash,
			xuid: self.xuid,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn fixture() -> Credential {
		Credential::builder(CredentialKind::Service)
			.value("xsts")
			.user_hash("1234")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Service credential fixture should build.")
	}

	#[test]
	fn status_transitions_cover_margin() {
		let credential = fixture();
		let margin = Duration::minutes(1);

		assert_eq!(
			credential.status_at(macros::datetime!(2024-12-31 23:59 UTC), margin),
			CredentialStatus::Pending
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 00:30 UTC), margin),
			CredentialStatus::Active
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 00:59:30 UTC), margin),
			CredentialStatus::Expiring
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-01 01:00 UTC), margin),
			CredentialStatus::Expired
		);
		assert!(!credential.is_valid_at(macros::datetime!(2025-01-01 00:59:30 UTC), margin));
		assert!(credential.is_valid_at(macros::datetime!(2025-01-01 00:59:30 UTC), Duration::ZERO));
	}

	#[test]
	fn builder_handles_relative_expiry_and_missing_fields() {
		let credential = Credential::builder(CredentialKind::Identity)
			.value("access")
			.refresh_token("refresh")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Identity credential should support relative expiry.");

		assert_eq!(credential.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(
			Credential::builder(CredentialKind::User).expires_in(Duration::hours(1)).build(),
			Err(CredentialBuilderError::MissingValue)
		);
		assert_eq!(
			Credential::builder(CredentialKind::User).value("user").build(),
			Err(CredentialBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn authorization_header_and_debug_hide_nothing_they_should_not() {
		let credential = fixture();

		assert_eq!(credential.authorization_header_value(), "XBL3.0 x=1234;xsts");
		assert!(!format!("{credential:?}").contains("xsts\""));
		assert_eq!(CredentialKind::Service.parent(), Some(CredentialKind::User));
		assert_eq!(CredentialKind::Identity.parent(), None);
	}
}
