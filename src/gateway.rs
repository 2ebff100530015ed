//! Authenticated Realms API client.
//!
//! [`Gateway`] composes a [`TokenChain`] with a [`BoundedTransport`]. Every logical call
//! validates the chain, sends one attempt with the XBL authorization header, and lets the
//! [`RetryPolicy`] decide between parsing the body, forcing one re-authentication on a 401,
//! backing off on a 502, or surfacing an [`ApiError`].

mod metrics;
mod model;
mod retry;

pub use metrics::RequestMetrics;
pub use model::*;
pub use retry::{RetryDecision, RetryPolicy};

// crates.io
use oauth2::http::{
	HeaderMap, HeaderName, HeaderValue, Method,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	chain::TokenChain,
	config::GatewayConfig,
	error::{ApiError, ConfigError, SchemaError, TransportError},
	http::HttpExecutor,
	obs::{self, OpKind, OpOutcome, OpSpan},
	transport::BoundedTransport,
};

const CLIENT_VERSION: &str = "client-version";
const JSON: &str = "application/json";

/// Realms API client with chained credentials, bounded concurrency, and retries.
pub struct Gateway<E>
where
	E: ?Sized + HttpExecutor,
{
	chain: Arc<TokenChain>,
	transport: BoundedTransport<E>,
	config: GatewayConfig,
	metrics: RequestMetrics,
}
impl<E> Gateway<E>
where
	E: ?Sized + HttpExecutor,
{
	/// Builds a gateway over an existing chain and transport.
	pub fn new(
		chain: Arc<TokenChain>,
		transport: BoundedTransport<E>,
		config: GatewayConfig,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self { chain, transport, config, metrics: RequestMetrics::default() })
	}

	/// Builds the transport from `config` and wires it to `chain`.
	pub fn from_parts(
		executor: Arc<E>,
		chain: Arc<TokenChain>,
		config: GatewayConfig,
	) -> Result<Self, ConfigError> {
		let transport = BoundedTransport::from_config(executor, &config)?;

		Self::new(chain, transport, config)
	}

	/// Credential chain backing this gateway.
	pub fn chain(&self) -> &Arc<TokenChain> {
		&self.chain
	}

	/// Underlying transport.
	pub fn transport(&self) -> &BoundedTransport<E> {
		&self.transport
	}

	/// Gateway settings.
	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}

	/// Request counters.
	pub fn metrics(&self) -> &RequestMetrics {
		&self.metrics
	}

	/// Validates the chain ahead of the first call.
	pub async fn warm_up(&self) -> Result<Credential> {
		self.chain.ensure_valid(false).await
	}

	/// Closes the transport; later calls fail with [`TransportError::Closed`].
	pub fn close(&self) {
		self.transport.close();
	}

	/// `GET worlds/{id}`.
	pub async fn fetch_realm(&self, realm_id: u64) -> Result<FullRealm> {
		self.request(Method::GET, &format!("worlds/{realm_id}"), None).await
	}

	/// `GET worlds/v1/link/{code}`.
	pub async fn fetch_realm_by_code(&self, code: &str) -> Result<FullRealm> {
		self.request(Method::GET, &format!("worlds/v1/link/{code}"), None).await
	}

	/// `GET worlds`.
	pub async fn fetch_realms(&self) -> Result<FullWorlds> {
		self.request(Method::GET, "worlds", None).await
	}

	/// `POST invites/v1/link/accept/{code}`. Not idempotent.
	pub async fn join_realm(&self, code: &str) -> Result<FullRealm> {
		self.request(Method::POST, &format!("invites/v1/link/accept/{code}"), None).await
	}

	/// `DELETE invites/{id}`. Not idempotent.
	pub async fn leave_realm(&self, realm_id: u64) -> Result<()> {
		let _: serde_json::Value =
			self.request(Method::DELETE, &format!("invites/{realm_id}"), None).await?;

		Ok(())
	}

	/// `GET activities/live/players`.
	pub async fn fetch_activities(&self) -> Result<ActivityList> {
		self.request(Method::GET, "activities/live/players", None).await
	}

	/// Live activity for one realm; `None` when nobody is online there.
	pub async fn fetch_activity(&self, realm_id: u64) -> Result<Option<RealmActivity>> {
		let activities = self.fetch_activities().await?;

		Ok(activities.servers.into_iter().find(|activity| activity.id == realm_id))
	}

	/// Runs one logical call and deserializes the body into `T`.
	///
	/// An empty 2xx body is parsed as JSON `null`.
	pub async fn request<T>(
		&self,
		method: Method,
		path: &str,
		body: Option<&serde_json::Value>,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let span = OpSpan::new(OpKind::Request, path);

		obs::record_op_outcome(OpKind::Request, OpOutcome::Attempt);

		let result = span.instrument(self.execute(method, path, body)).await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_op_outcome(OpKind::Request, OpOutcome::Success);
			},
			Err(err) => {
				self.metrics.record_failure();
				obs::record_op_outcome(OpKind::Request, OpOutcome::Failure);
				obs::warn_event(OpKind::Request, format_args!("`{path}` failed: {err}"));
			},
		}

		result
	}

	async fn execute<T>(
		&self,
		method: Method,
		path: &str,
		body: Option<&serde_json::Value>,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let payload = match body {
			Some(value) => serde_json::to_vec(value).map_err(TransportError::invalid_request)?,
			None => Vec::new(),
		};
		let mut attempt = 1;
		let mut force = false;
		let mut reauthenticated = false;

		loop {
			let credential = self.chain.ensure_valid(force).await?;
			let headers = self.headers(&credential, body.is_some())?;

			self.metrics.record_attempt();

			let response =
				self.transport.send(method.clone(), path, headers, payload.clone()).await?;
			let status = response.status().as_u16();

			match self.config.retry.decide(status, attempt, reauthenticated) {
				RetryDecision::Accept => return parse_body(path, response.body()),
				RetryDecision::Reauthenticate => {
					reauthenticated = true;
					force = true;

					self.metrics.record_unauthorized_retry();
					obs::record_op_outcome(OpKind::Request, OpOutcome::Retry);
					obs::debug_event(
						OpKind::Request,
						format_args!("`{path}` answered 401; forcing a credential refresh"),
					);
				},
				RetryDecision::Backoff { delay } => {
					self.metrics.record_transient_retry();
					obs::record_op_outcome(OpKind::Request, OpOutcome::Retry);
					obs::debug_event(
						OpKind::Request,
						format_args!("`{path}` answered {status} on attempt {attempt}; retrying"),
					);
					tokio::time::sleep(delay).await;

					attempt += 1;
					force = true;
				},
				RetryDecision::Fail =>
					return Err(ApiError::from_body(status, path, response.body()).into()),
			}
		}
	}

	fn headers(
		&self,
		credential: &Credential,
		has_body: bool,
	) -> Result<HeaderMap, TransportError> {
		let mut headers = HeaderMap::new();

		headers.insert(AUTHORIZATION, header_value(&credential.authorization_header_value())?);
		headers.insert(
			HeaderName::from_static(CLIENT_VERSION),
			header_value(&self.config.client_version)?,
		);
		headers.insert(USER_AGENT, header_value(&self.config.user_agent)?);
		headers.insert(ACCEPT, HeaderValue::from_static(JSON));

		if has_body {
			headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
		}

		Ok(headers)
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<crate::http::ReqwestHttpClient> {
	/// Builds the production stack from `settings`: reqwest executor, Xbox Live issuer, file
	/// store at `tokens_location`, and a chain seeded from it.
	pub async fn connect(settings: crate::config::Settings) -> Result<Self> {
		let executor = Arc::new(crate::http::ReqwestHttpClient::new()?);
		let issuer =
			Arc::new(crate::issuer::XboxLiveIssuer::new(executor.clone(), settings.issuer)?);
		let store = Arc::new(crate::store::FileStore::open(&settings.tokens_location)?);
		let chain = TokenChain::from_store(issuer, store, settings.chain).await?;

		Ok(Self::from_parts(executor, Arc::new(chain), settings.gateway)?)
	}
}
impl<E> Debug for Gateway<E>
where
	E: ?Sized + HttpExecutor,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("chain", &self.chain)
			.field("transport", &self.transport)
			.field("client_version", &self.config.client_version)
			.finish()
	}
}

fn header_value(raw: &str) -> Result<HeaderValue, TransportError> {
	HeaderValue::from_str(raw).map_err(TransportError::invalid_request)
}

fn parse_body<T>(path: &str, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"null" } else { body };
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| SchemaError { path: path.to_owned(), source }.into())
}
