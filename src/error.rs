//! Gateway-level error types shared across the chain, transport, and domain calls.

// self
use crate::{_prelude::*, auth::CredentialKind};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CAUSE_PREVIEW_LIMIT: usize = 256;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// A credential refresh call failed.
	#[error(transparent)]
	AuthRefresh(#[from] AuthRefreshError),
	/// Network-level failure independent of any HTTP status.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Non-2xx response that the retry policy did not resolve.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// 2xx response whose body does not match the expected shape.
	#[error(transparent)]
	Schema(#[from] SchemaError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Persistence-hook failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}
impl Error {
	/// Buckets the error by the operator response it calls for.
	pub fn class(&self) -> FailureClass {
		match self {
			Self::AuthRefresh(_) => FailureClass::Authentication,
			Self::Api(err) if err.status == 401 => FailureClass::Authentication,
			Self::Api(_) | Self::Transport(_) => FailureClass::Backend,
			Self::Schema(_) => FailureClass::Contract,
			Self::Config(_) | Self::Storage(_) => FailureClass::Local,
		}
	}

	/// Returns the HTTP status carried by an [`ApiError`], if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(err) => Some(err.status),
			Self::AuthRefresh(AuthRefreshError::Rejected { status, .. }) => *status,
			_ => None,
		}
	}
}

/// Coarse classification callers use to choose an operator-facing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
	/// Credentials are broken; re-provision them.
	Authentication,
	/// The backend is unavailable or refused the request (including a 403 on a realm the
	/// account cannot access); wait, retry, or fix the request.
	Backend,
	/// The backend answered with an unexpected payload shape.
	Contract,
	/// Local configuration or storage failure.
	Local,
}

/// Failures raised while refreshing one stage of the credential chain.
#[derive(Debug, ThisError)]
pub enum AuthRefreshError {
	/// The token service answered with an error response.
	#[error("The {stage} token service rejected the refresh: {reason}.")]
	Rejected {
		/// Stage that failed.
		stage: CredentialKind,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Service-supplied reason string.
		reason: String,
	},
	/// The refresh call never produced a response.
	#[error("The {stage} refresh call failed in transport.")]
	Transport {
		/// Stage that failed.
		stage: CredentialKind,
		/// Underlying transport failure.
		#[source]
		source: TransportError,
	},
	/// The token service answered 2xx with a body that could not be parsed.
	#[error("The {stage} token service returned malformed JSON.")]
	MalformedResponse {
		/// Stage that failed.
		stage: CredentialKind,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The identity credential carries no refresh token.
	#[error("The identity credential is missing a refresh token.")]
	MissingRefreshToken,
	/// A stage was about to refresh while its parent was still invalid.
	#[error("Cannot refresh the {stage} credential before its parent is valid.")]
	ParentInvalid {
		/// Stage whose parent was invalid.
		stage: CredentialKind,
	},
}
impl AuthRefreshError {
	/// Returns the stage that failed, when the failure is stage-specific.
	pub fn stage(&self) -> Option<CredentialKind> {
		match self {
			Self::Rejected { stage, .. }
			| Self::Transport { stage, .. }
			| Self::MalformedResponse { stage, .. }
			| Self::ParentInvalid { stage } => Some(*stage),
			Self::MissingRefreshToken => Some(CredentialKind::Identity),
		}
	}
}

/// Transport-level failures (network, IO, timeouts, closed permit pools).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call exceeded its per-attempt timeout.
	#[error("The remote call timed out after {after:?}.")]
	Timeout {
		/// Timeout that elapsed.
		after: StdDuration,
	},
	/// A request path could not be joined onto the base URL.
	#[error("Request path `{path}` does not form a valid URL.")]
	InvalidUrl {
		/// Offending relative path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The outbound request could not be assembled.
	#[error("The outbound request could not be built.")]
	InvalidRequest {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
	/// The transport has been closed and no longer hands out permits.
	#[error("The transport is closed.")]
	Closed,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a request-construction failure.
	pub fn invalid_request(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidRequest { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			return Self::invalid_request(e);
		}

		Self::network(e)
	}
}

/// Non-2xx API response, with the status and a preview of what the backend said.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("The Realms API answered {status} for `{path}`: {cause}.")]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// Relative request path.
	pub path: String,
	/// Body preview or canonical reason phrase.
	pub cause: String,
}
impl ApiError {
	/// Builds an error from a raw response body, truncating long payloads.
	pub fn from_body(status: u16, path: impl Into<String>, body: &[u8]) -> Self {
		let text = String::from_utf8_lossy(body);
		let trimmed = text.trim();
		let cause = if trimmed.is_empty() {
			oauth2::http::StatusCode::from_u16(status)
				.ok()
				.and_then(|code| code.canonical_reason())
				.unwrap_or("no response body")
				.to_owned()
		} else {
			trimmed.chars().take(CAUSE_PREVIEW_LIMIT).collect()
		};

		Self { status, path: path.into(), cause }
	}
}

/// 2xx response whose body did not deserialize into the expected record.
#[derive(Debug, ThisError)]
#[error("Response for `{path}` does not match the expected shape.")]
pub struct SchemaError {
	/// Relative request path.
	pub path: String,
	/// Structured parsing failure, including the JSON path of the mismatch.
	#[source]
	pub source: serde_path_to_error::Error<serde_json::Error>,
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured endpoint is not a valid URL.
	#[error("Configured endpoint `{name}` is not a valid URL.")]
	InvalidEndpoint {
		/// Setting name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A required environment variable is absent.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// A setting holds an unusable value.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// The concurrency ceiling must allow at least one call.
	#[error("The transport needs at least one permit.")]
	ZeroPermits,
	/// A component that schedules timers was built outside a Tokio runtime.
	#[error("A Tokio runtime is required to schedule cache eviction.")]
	MissingRuntime,
	/// The seed identity credential could not be found.
	#[error("No persisted identity credential is available to seed the chain.")]
	MissingSeed,
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn api_error_previews_body_and_falls_back_to_reason() {
		let err = ApiError::from_body(502, "worlds", b"");

		assert_eq!(err.cause, "Bad Gateway");

		let long = "x".repeat(CAUSE_PREVIEW_LIMIT * 2);
		let err = ApiError::from_body(400, "worlds", long.as_bytes());

		assert_eq!(err.cause.len(), CAUSE_PREVIEW_LIMIT);
		assert_eq!(err.path, "worlds");
	}

	#[test]
	fn classes_separate_auth_from_backend_failures() {
		let auth: Error = AuthRefreshError::MissingRefreshToken.into();
		let unauthorized: Error = ApiError::from_body(401, "worlds", b"").into();
		let bad_gateway: Error = ApiError::from_body(502, "worlds", b"").into();
		let timeout: Error = TransportError::Timeout { after: StdDuration::from_secs(1) }.into();

		assert_eq!(auth.class(), FailureClass::Authentication);
		assert_eq!(unauthorized.class(), FailureClass::Authentication);
		assert_eq!(bad_gateway.class(), FailureClass::Backend);
		assert_eq!(timeout.class(), FailureClass::Backend);
		assert_eq!(bad_gateway.status(), Some(502));

		let forbidden: Error = ApiError::from_body(403, "invites/1", b"").into();

		assert_eq!(forbidden.class(), FailureClass::Backend);
	}

	#[test]
	fn refresh_errors_report_their_stage() {
		let err = AuthRefreshError::Rejected {
			stage: CredentialKind::User,
			status: Some(400),
			reason: "bad ticket".into(),
		};

		assert_eq!(err.stage(), Some(CredentialKind::User));
		assert!(err.to_string().contains("user"));
		assert_eq!(AuthRefreshError::MissingRefreshToken.stage(), Some(CredentialKind::Identity));
	}
}
