//! Microsoft account + Xbox Live issuer.
//!
//! The identity stage is a standard OAuth 2.0 refresh-token grant against the Microsoft account
//! token endpoint. The user and service stages are Xbox Live JSON endpoints that both answer
//! with the same envelope:
//!
//! ```json
//! {"IssueInstant":"…","NotAfter":"…","Token":"…","DisplayClaims":{"xui":[{"uhs":"…"}]}}
//! ```

// crates.io
use oauth2::http::{
	Method, Request,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	config::IssuerConfig,
	error::{AuthRefreshError, ConfigError, TransportError},
	http::HttpExecutor,
	issuer::{CredentialIssuer, IssueFuture},
	oauth::RefreshGrant,
};

const CONTRACT_VERSION_HEADER: &str = "x-xbl-contract-version";
const USER_RELYING_PARTY: &str = "http://auth.xboxlive.com";
const USER_SITE_NAME: &str = "user.auth.xboxlive.com";
const REJECTION_PREVIEW_LIMIT: usize = 256;

/// Default [`CredentialIssuer`] speaking to Microsoft account and Xbox Live.
pub struct XboxLiveIssuer<E>
where
	E: ?Sized + HttpExecutor,
{
	executor: Arc<E>,
	grant: RefreshGrant,
	config: IssuerConfig,
}
impl<E> XboxLiveIssuer<E>
where
	E: ?Sized + HttpExecutor,
{
	/// Builds an issuer that sends every call through `executor`.
	pub fn new(executor: Arc<E>, config: IssuerConfig) -> Result<Self, ConfigError> {
		let grant = RefreshGrant::new(
			&config.token_endpoint,
			&config.client_id,
			config.client_secret.as_deref(),
			config.scopes.iter().cloned(),
		)?;

		Ok(Self { executor, grant, config })
	}

	/// Returns the issuer configuration.
	pub fn config(&self) -> &IssuerConfig {
		&self.config
	}

	async fn authenticate<B>(
		&self,
		stage: CredentialKind,
		endpoint: &Url,
		body: &B,
	) -> Result<Credential, AuthRefreshError>
	where
		B: Serialize,
	{
		let transport = |source: TransportError| AuthRefreshError::Transport { stage, source };
		let payload = serde_json::to_vec(body)
			.map_err(|e| transport(TransportError::invalid_request(e)))?;
		let request = Request::builder()
			.method(Method::POST)
			.uri(endpoint.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.header(CONTRACT_VERSION_HEADER, "1")
			.body(payload)
			.map_err(|e| transport(TransportError::invalid_request(e)))?;
		let response = self.executor.execute(request).await.map_err(transport)?;
		let status = response.status();

		if !status.is_success() {
			return Err(AuthRefreshError::Rejected {
				stage,
				status: Some(status.as_u16()),
				reason: rejection_reason(response.body()),
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());
		let envelope: XboxTokenEnvelope = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| AuthRefreshError::MalformedResponse { stage, source })?;

		envelope.into_credential(stage)
	}
}
impl<E> CredentialIssuer for XboxLiveIssuer<E>
where
	E: ?Sized + HttpExecutor,
{
	fn refresh_identity<'a>(&'a self, identity: &'a Credential) -> IssueFuture<'a> {
		Box::pin(self.grant.refresh(self.executor.as_ref(), identity))
	}

	fn request_user<'a>(&'a self, identity: &'a Credential) -> IssueFuture<'a> {
		Box::pin(async move {
			let body = UserAuthenticateRequest {
				relying_party: USER_RELYING_PARTY,
				token_type: "JWT",
				properties: UserProperties {
					auth_method: "RPS",
					site_name: USER_SITE_NAME,
					rps_ticket: format!(
						"{}{}",
						self.config.rps_ticket_prefix,
						identity.value.expose()
					),
				},
			};

			self.authenticate(CredentialKind::User, &self.config.user_endpoint, &body).await
		})
	}

	fn request_service<'a>(&'a self, user: &'a Credential) -> IssueFuture<'a> {
		Box::pin(async move {
			let body = ServiceAuthorizeRequest {
				relying_party: &self.config.relying_party,
				token_type: "JWT",
				properties: ServiceProperties {
					sandbox_id: &self.config.sandbox_id,
					user_tokens: [user.value.expose()],
				},
			};

			self.authenticate(CredentialKind::Service, &self.config.service_endpoint, &body).await
		})
	}
}
impl<E> Debug for XboxLiveIssuer<E>
where
	E: ?Sized + HttpExecutor,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("XboxLiveIssuer")
			.field("token_endpoint", &self.config.token_endpoint.as_str())
			.field("user_endpoint", &self.config.user_endpoint.as_str())
			.field("service_endpoint", &self.config.service_endpoint.as_str())
			.field("relying_party", &self.config.relying_party)
			.finish()
	}
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserAuthenticateRequest {
	relying_party: &'static str,
	token_type: &'static str,
	properties: UserProperties,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserProperties {
	auth_method: &'static str,
	site_name: &'static str,
	rps_ticket: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceAuthorizeRequest<'a> {
	relying_party: &'a str,
	token_type: &'static str,
	properties: ServiceProperties<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceProperties<'a> {
	sandbox_id: &'a str,
	user_tokens: [&'a str; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxTokenEnvelope {
	#[serde(with = "time::serde::rfc3339")]
	issue_instant: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	not_after: OffsetDateTime,
	token: String,
	display_claims: DisplayClaims,
}
impl XboxTokenEnvelope {
	fn into_credential(self, stage: CredentialKind) -> Result<Credential, AuthRefreshError> {
		if self.token.is_empty() {
			return Err(AuthRefreshError::Rejected {
				stage,
				status: None,
				reason: "token response carries an empty token".into(),
			});
		}

		let claim = self.display_claims.xui.into_iter().next();
		let mut credential = Credential::new(stage, self.token, self.issue_instant, self.not_after);

		if let Some(claim) = claim {
			credential.user_hash = claim.uhs;
			credential.xuid = claim.xid;
		}
		if stage == CredentialKind::Service && credential.user_hash.is_none() {
			return Err(AuthRefreshError::Rejected {
				stage,
				status: None,
				reason: "token response is missing the uhs claim".into(),
			});
		}

		Ok(credential)
	}
}

#[derive(Deserialize)]
struct DisplayClaims {
	#[serde(default)]
	xui: Vec<XuiClaim>,
}

#[derive(Deserialize)]
struct XuiClaim {
	uhs: Option<String>,
	xid: Option<String>,
}

// XSTS rejections carry `{"XErr": 2148916233, "Message": "..."}`; fall back to a raw preview.
#[derive(Deserialize)]
struct XboxRejection {
	#[serde(rename = "XErr")]
	code: u64,
	#[serde(rename = "Message", default)]
	message: Option<String>,
}

fn rejection_reason(body: &[u8]) -> String {
	if let Ok(rejection) = serde_json::from_slice::<XboxRejection>(body) {
		return match rejection.message.filter(|message| !message.is_empty()) {
			Some(message) => format!("XErr {}: {message}", rejection.code),
			None => format!("XErr {}", rejection.code),
		};
	}

	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		"empty response body".into()
	} else {
		trimmed.chars().take(REJECTION_PREVIEW_LIMIT).collect()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedExecutor, ScriptedReply, credential};

	const ENVELOPE: &str = r#"{
		"IssueInstant": "2025-01-01T00:00:00.1234567Z",
		"NotAfter": "2025-01-01T16:00:00.1234567Z",
		"Token": "xsts-token",
		"DisplayClaims": {"xui": [{"uhs": "4242", "xid": "2535400000000000", "gtg": "Steve"}]}
	}"#;

	fn issuer(executor: Arc<ScriptedExecutor>) -> XboxLiveIssuer<ScriptedExecutor> {
		let config = IssuerConfig::xbox_live("client-id", None).expect("Default config should build.");

		XboxLiveIssuer::new(executor, config).expect("Issuer should build.")
	}

	#[tokio::test]
	async fn service_stage_parses_envelope_and_claims() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(200, ENVELOPE)));
		let user = credential(CredentialKind::User, "user-token", Duration::hours(1));
		let service = issuer(executor.clone())
			.request_service(&user)
			.await
			.expect("Envelope should parse into a service credential.");

		assert_eq!(service.kind, CredentialKind::Service);
		assert_eq!(service.value.expose(), "xsts-token");
		assert_eq!(service.user_hash.as_deref(), Some("4242"));
		assert_eq!(service.xuid.as_deref(), Some("2535400000000000"));
		assert_eq!(service.expires_at - service.issued_at, Duration::hours(16));
		assert_eq!(
			executor.recorded()[0].0,
			"https://xsts.auth.xboxlive.com/xsts/authorize"
		);
	}

	#[tokio::test]
	async fn xsts_rejections_surface_the_xerr_code() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(
			401,
			r#"{"Identity":"0","XErr":2148916233,"Message":"","Redirect":""}"#,
		)));
		let user = credential(CredentialKind::User, "user-token", Duration::hours(1));
		let err = issuer(executor)
			.request_service(&user)
			.await
			.expect_err("A 401 from XSTS should be a rejection.");

		match err {
			AuthRefreshError::Rejected { stage, status, reason } => {
				assert_eq!(stage, CredentialKind::Service);
				assert_eq!(status, Some(401));
				assert_eq!(reason, "XErr 2148916233");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn malformed_user_envelope_reports_the_json_path() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(
			200,
			r#"{"IssueInstant":"2025-01-01T00:00:00Z","NotAfter":42,"Token":"t","DisplayClaims":{}}"#,
		)));
		let identity = credential(CredentialKind::Identity, "access", Duration::hours(1));
		let err = issuer(executor)
			.request_user(&identity)
			.await
			.expect_err("A numeric NotAfter should not parse.");

		match err {
			AuthRefreshError::MalformedResponse { stage, source } => {
				assert_eq!(stage, CredentialKind::User);
				assert_eq!(source.path().to_string(), "NotAfter");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn request_bodies_match_the_xbox_contract() {
		let body = UserAuthenticateRequest {
			relying_party: USER_RELYING_PARTY,
			token_type: "JWT",
			properties: UserProperties {
				auth_method: "RPS",
				site_name: USER_SITE_NAME,
				rps_ticket: "d=access".into(),
			},
		};
		let value = serde_json::to_value(&body).expect("User body should serialize.");

		assert_eq!(value["RelyingParty"], "http://auth.xboxlive.com");
		assert_eq!(value["Properties"]["RpsTicket"], "d=access");
		assert_eq!(value["Properties"]["SiteName"], "user.auth.xboxlive.com");

		let body = ServiceAuthorizeRequest {
			relying_party: "https://pocket.realms.minecraft.net/",
			token_type: "JWT",
			properties: ServiceProperties { sandbox_id: "RETAIL", user_tokens: ["user"] },
		};
		let value = serde_json::to_value(&body).expect("Service body should serialize.");

		assert_eq!(value["Properties"]["UserTokens"][0], "user");
		assert_eq!(value["Properties"]["SandboxId"], "RETAIL");
	}
}
