//! OAuth 2.0 facade for the identity stage's refresh-token grant.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	error::{AuthRefreshError, ConfigError, TransportError},
	http::{ExecutorHandle, HttpExecutor},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const STAGE: CredentialKind = CredentialKind::Identity;

/// Refresh-token client bound to one token endpoint and client registration.
#[derive(Clone, Debug)]
pub struct RefreshGrant {
	oauth_client: ConfiguredBasicClient,
	scopes: Vec<String>,
}
impl RefreshGrant {
	/// Builds the grant client. Empty secrets are treated as a public client.
	pub fn new(
		token_endpoint: &Url,
		client_id: &str,
		client_secret: Option<&str>,
		scopes: impl IntoIterator<Item = impl Into<String>>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { name: "token_endpoint", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = client_secret.filter(|value| !value.is_empty()) {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}

		Ok(Self { oauth_client, scopes: scopes.into_iter().map(Into::into).collect() })
	}

	/// Exchanges the identity credential's refresh token for a new identity credential.
	///
	/// Providers that do not rotate refresh tokens keep the previous one.
	pub async fn refresh<E>(
		&self,
		executor: &E,
		identity: &Credential,
	) -> Result<Credential, AuthRefreshError>
	where
		E: ?Sized + HttpExecutor,
	{
		let previous =
			identity.refresh_token.as_ref().ok_or(AuthRefreshError::MissingRefreshToken)?;
		let secret = RefreshToken::new(previous.expose().to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&secret);

		for scope in &self.scopes {
			request = request.add_scope(Scope::new(scope.clone()));
		}

		let handle = ExecutorHandle::new(executor);
		let response = request.request_async(&handle).await.map_err(map_request_error)?;
		let expires_in = response
			.expires_in()
			.ok_or_else(|| rejected(None, "token response is missing expires_in"))?;
		let expires_in = i64::try_from(expires_in.as_secs())
			.map_err(|_| rejected(None, "expires_in exceeds the supported range"))?;

		if expires_in <= 0 {
			return Err(rejected(None, "expires_in must be positive"));
		}

		let refresh_token = response
			.refresh_token()
			.map(|token| token.secret().to_owned())
			.unwrap_or_else(|| previous.expose().to_owned());

		Credential::builder(STAGE)
			.value(response.access_token().secret().to_owned())
			.refresh_token(refresh_token)
			.issued_at(OffsetDateTime::now_utc())
			.expires_in(Duration::seconds(expires_in))
			.build()
			.map_err(|err| rejected(None, err.to_string()))
	}
}

fn map_request_error(err: BasicRequestTokenError<TransportError>) -> AuthRefreshError {
	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(&response),
		RequestTokenError::Request(source) => AuthRefreshError::Transport { stage: STAGE, source },
		RequestTokenError::Parse(source, _body) =>
			AuthRefreshError::MalformedResponse { stage: STAGE, source },
		RequestTokenError::Other(message) => rejected(None, message),
	}
}

fn map_server_response(response: &BasicErrorResponse) -> AuthRefreshError {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	rejected(Some(400), reason)
}

fn rejected(status: Option<u16>, reason: impl Into<String>) -> AuthRefreshError {
	AuthRefreshError::Rejected { stage: STAGE, status, reason: reason.into() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedExecutor, ScriptedReply, credential};

	fn grant() -> RefreshGrant {
		let endpoint = Url::parse("https://login.example.com/oauth20_token.srf")
			.expect("Token endpoint fixture should parse.");

		RefreshGrant::new(&endpoint, "client-id", Some(""), ["Xboxlive.signin"])
			.expect("Refresh grant should build.")
	}

	#[tokio::test]
	async fn refresh_keeps_previous_refresh_token_when_not_rotated() {
		let executor = ScriptedExecutor::always(ScriptedReply::new(
			200,
			r#"{"access_token":"access-2","token_type":"bearer","expires_in":3600}"#,
		));
		let identity = credential(CredentialKind::Identity, "access-1", Duration::hours(1));
		let refreshed =
			grant().refresh(&executor, &identity).await.expect("Refresh should succeed.");

		assert_eq!(refreshed.value.expose(), "access-2");
		assert_eq!(
			refreshed.refresh_token.as_ref().map(|token| token.expose()),
			Some("access-1-refresh")
		);
		assert_eq!(refreshed.kind, CredentialKind::Identity);
	}

	#[tokio::test]
	async fn refresh_maps_oauth_errors_to_rejections() {
		let executor = ScriptedExecutor::always(ScriptedReply::new(
			400,
			r#"{"error":"invalid_grant","error_description":"expired"}"#,
		));
		let identity = credential(CredentialKind::Identity, "access-1", Duration::hours(1));
		let err = grant()
			.refresh(&executor, &identity)
			.await
			.expect_err("Invalid grants should surface.");

		assert!(
			matches!(err, AuthRefreshError::Rejected { ref reason, .. } if reason.contains("invalid_grant"))
		);
	}

	#[tokio::test]
	async fn refresh_requires_a_refresh_token() {
		let executor = ScriptedExecutor::default();
		let mut identity = credential(CredentialKind::Identity, "access-1", Duration::hours(1));

		identity.refresh_token = None;

		let err = grant()
			.refresh(&executor, &identity)
			.await
			.expect_err("Missing refresh tokens should be rejected before any call.");

		assert!(matches!(err, AuthRefreshError::MissingRefreshToken));
		assert_eq!(executor.calls(), 0);
	}
}
