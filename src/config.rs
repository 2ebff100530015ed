//! Gateway, issuer, and chain settings plus environment loading.
//!
//! Every struct starts from the public Realms/Xbox Live defaults and is adjusted through
//! `with_*` setters. [`Settings::from_env`] reads the same variables the bot deployment sets:
//! `XBOX_CLIENT_ID`, `XBOX_CLIENT_SECRET`, `XAPI_TOKENS_LOCATION`, `MC_VERSION`, and the
//! optional `REALMS_API_URL` and `REALMS_GATEWAY_PERMITS`.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, error::ConfigError, gateway::RetryPolicy};

/// Default Realms API base URL; also the XSTS relying party.
pub const DEFAULT_REALMS_API_URL: &str = "https://pocket.realms.minecraft.net/";
/// User agent the Bedrock client sends.
pub const DEFAULT_USER_AGENT: &str = "MCPE/UWP";
/// Microsoft account OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://login.live.com/oauth20_token.srf";
/// Xbox Live user-token endpoint.
pub const DEFAULT_USER_ENDPOINT: &str = "https://user.auth.xboxlive.com/user/authenticate";
/// Xbox Live XSTS endpoint.
pub const DEFAULT_SERVICE_ENDPOINT: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
/// Scopes requested on every identity refresh.
pub const DEFAULT_SCOPES: [&str; 2] = ["Xboxlive.signin", "Xboxlive.offline_access"];
/// Default concurrency ceiling for the Realms transport.
pub const DEFAULT_PERMITS: usize = 3;
/// Default per-attempt timeout.
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Settings for the Realms-facing half of the gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Base URL every request path is joined onto; always ends with `/`.
	pub api_base: Url,
	/// Value of the `Client-Version` header.
	pub client_version: String,
	/// Value of the `User-Agent` header.
	pub user_agent: String,
	/// Number of concurrent in-flight calls allowed.
	pub permits: usize,
	/// Timeout applied to each attempt.
	pub request_timeout: StdDuration,
	/// Status-driven retry policy.
	pub retry: RetryPolicy,
}
impl GatewayConfig {
	/// Creates a config for `api_base` with default headers, permits, timeout, and retries.
	pub fn new(api_base: Url, client_version: impl Into<String>) -> Self {
		Self {
			api_base: with_trailing_slash(api_base),
			client_version: client_version.into(),
			user_agent: DEFAULT_USER_AGENT.into(),
			permits: DEFAULT_PERMITS,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			retry: RetryPolicy::default(),
		}
	}

	/// Creates a config targeting the public Realms API.
	pub fn realms(client_version: impl Into<String>) -> Result<Self, ConfigError> {
		Ok(Self::new(parse_endpoint("api_base", DEFAULT_REALMS_API_URL)?, client_version))
	}

	/// Overrides the user agent.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the concurrency ceiling.
	pub fn with_permits(mut self, permits: usize) -> Self {
		self.permits = permits;

		self
	}

	/// Overrides the per-attempt timeout.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Rejects settings the transport cannot honor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.permits == 0 {
			return Err(ConfigError::ZeroPermits);
		}
		if self.retry.max_attempts == 0 {
			return Err(ConfigError::InvalidSetting {
				name: "retry.max_attempts",
				reason: "at least one attempt is required".into(),
			});
		}

		Ok(())
	}
}

/// Settings for the three token services.
#[derive(Clone, Debug)]
pub struct IssuerConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; `None` for public clients.
	pub client_secret: Option<String>,
	/// Identity-stage token endpoint.
	pub token_endpoint: Url,
	/// User-stage endpoint.
	pub user_endpoint: Url,
	/// Service-stage endpoint.
	pub service_endpoint: Url,
	/// Relying party the service token is scoped to.
	pub relying_party: String,
	/// Sandbox requested for the service token.
	pub sandbox_id: String,
	/// Scopes requested on identity refresh.
	pub scopes: Vec<String>,
	/// Prefix placed before the identity access token in the user-stage ticket.
	pub rps_ticket_prefix: String,
}
impl IssuerConfig {
	/// Creates a config for the public Microsoft/Xbox Live services.
	pub fn xbox_live(
		client_id: impl Into<String>,
		client_secret: Option<String>,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			client_id: client_id.into(),
			client_secret: client_secret.filter(|secret| !secret.is_empty()),
			token_endpoint: parse_endpoint("token_endpoint", DEFAULT_TOKEN_ENDPOINT)?,
			user_endpoint: parse_endpoint("user_endpoint", DEFAULT_USER_ENDPOINT)?,
			service_endpoint: parse_endpoint("service_endpoint", DEFAULT_SERVICE_ENDPOINT)?,
			relying_party: DEFAULT_REALMS_API_URL.into(),
			sandbox_id: "RETAIL".into(),
			scopes: DEFAULT_SCOPES.iter().map(|scope| (*scope).to_owned()).collect(),
			rps_ticket_prefix: "d=".into(),
		})
	}

	/// Points all three stages at other endpoints (useful for mocks and proxies).
	pub fn with_endpoints(mut self, token: Url, user: Url, service: Url) -> Self {
		self.token_endpoint = token;
		self.user_endpoint = user;
		self.service_endpoint = service;

		self
	}

	/// Overrides the relying party.
	pub fn with_relying_party(mut self, relying_party: impl Into<String>) -> Self {
		self.relying_party = relying_party.into();

		self
	}
}

/// Settings for the credential chain.
#[derive(Clone, Copy, Debug)]
pub struct ChainConfig {
	/// Credentials within this window of expiry count as invalid.
	pub safety_margin: Duration,
	/// Upper bound on each stage's issuer call; the refresh guard is held for at most this long
	/// per stage.
	pub refresh_timeout: StdDuration,
}
impl ChainConfig {
	/// Overrides the per-stage refresh timeout.
	pub fn with_refresh_timeout(mut self, timeout: StdDuration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Overrides the safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}
}
impl Default for ChainConfig {
	fn default() -> Self {
		Self { safety_margin: Duration::seconds(60), refresh_timeout: DEFAULT_REQUEST_TIMEOUT }
	}
}

/// Everything needed to build a gateway at startup.
#[derive(Clone, Debug)]
pub struct Settings {
	/// Realms-facing settings.
	pub gateway: GatewayConfig,
	/// Token service settings.
	pub issuer: IssuerConfig,
	/// Chain settings.
	pub chain: ChainConfig,
	/// Path of the persisted identity credential.
	pub tokens_location: PathBuf,
}
impl Settings {
	/// Loads settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads settings through an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let required = |name: &'static str| {
			lookup(name).filter(|value| !value.is_empty()).ok_or(ConfigError::MissingEnv { name })
		};
		let client_id = required("XBOX_CLIENT_ID")?;
		let tokens_location = PathBuf::from(required("XAPI_TOKENS_LOCATION")?);
		let client_version = required("MC_VERSION")?;
		let api_base = match lookup("REALMS_API_URL").filter(|value| !value.is_empty()) {
			Some(raw) => parse_endpoint("REALMS_API_URL", &raw)?,
			None => parse_endpoint("REALMS_API_URL", DEFAULT_REALMS_API_URL)?,
		};
		let mut gateway = GatewayConfig::new(api_base.clone(), client_version);

		if let Some(raw) = lookup("REALMS_GATEWAY_PERMITS") {
			let permits = raw.trim().parse::<usize>().map_err(|e| ConfigError::InvalidSetting {
				name: "REALMS_GATEWAY_PERMITS",
				reason: e.to_string(),
			})?;

			gateway = gateway.with_permits(permits);
		}

		gateway.validate()?;

		let issuer = IssuerConfig::xbox_live(client_id, lookup("XBOX_CLIENT_SECRET"))?
			.with_relying_party(api_base.as_str());

		Ok(Self { gateway, issuer, chain: ChainConfig::default(), tokens_location })
	}
}

fn parse_endpoint(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { name, source })
}

fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}
