//! Bounded-concurrency transport for the Realms API.
//!
//! [`BoundedTransport`] wraps any [`HttpExecutor`] with a FIFO permit pool and a per-attempt
//! timeout. It resolves paths against a fixed base URL and returns raw responses; status
//! handling and retries belong to the gateway.

// crates.io
use oauth2::{
	HttpResponse,
	http::{HeaderMap, Method, Request},
};
use tokio::sync::Semaphore;
// self
use crate::{
	_prelude::*,
	config::GatewayConfig,
	error::{ConfigError, TransportError},
	http::HttpExecutor,
};

/// Concurrency-limited, timeout-bounded view over an [`HttpExecutor`].
pub struct BoundedTransport<E>
where
	E: ?Sized + HttpExecutor,
{
	executor: Arc<E>,
	base: Url,
	permits: usize,
	semaphore: Arc<Semaphore>,
	timeout: StdDuration,
}
impl<E> BoundedTransport<E>
where
	E: ?Sized + HttpExecutor,
{
	/// Creates a transport allowing `permits` concurrent calls of at most `timeout` each.
	pub fn new(
		executor: Arc<E>,
		base: Url,
		permits: usize,
		timeout: StdDuration,
	) -> Result<Self, ConfigError> {
		if permits == 0 {
			return Err(ConfigError::ZeroPermits);
		}

		Ok(Self {
			executor,
			base,
			permits,
			semaphore: Arc::new(Semaphore::new(permits)),
			timeout,
		})
	}

	/// Creates a transport from the gateway settings.
	pub fn from_config(executor: Arc<E>, config: &GatewayConfig) -> Result<Self, ConfigError> {
		Self::new(executor, config.api_base.clone(), config.permits, config.request_timeout)
	}

	/// Base URL every path is resolved against.
	pub fn base(&self) -> &Url {
		&self.base
	}

	/// Configured number of permits.
	pub fn permits(&self) -> usize {
		self.permits
	}

	/// Permits not currently held by an in-flight call.
	pub fn available_permits(&self) -> usize {
		self.semaphore.available_permits()
	}

	/// Per-attempt timeout.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}

	/// Closes the permit pool; queued and future calls fail with [`TransportError::Closed`].
	pub fn close(&self) {
		self.semaphore.close();
	}

	/// Returns `true` once [`BoundedTransport::close`] has been called.
	pub fn is_closed(&self) -> bool {
		self.semaphore.is_closed()
	}

	/// Resolves `path` against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, TransportError> {
		self.base
			.join(path)
			.map_err(|source| TransportError::InvalidUrl { path: path.to_owned(), source })
	}

	/// Sends one request and returns the raw response.
	///
	/// The permit is held until the executor answers, times out, or the future is dropped. The
	/// timeout covers the executor call only, not the wait for a permit.
	pub async fn send(
		&self,
		method: Method,
		path: &str,
		headers: HeaderMap,
		body: Vec<u8>,
	) -> Result<HttpResponse, TransportError> {
		let url = self.resolve(path)?;
		let mut request = Request::builder()
			.method(method)
			.uri(url.as_str())
			.body(body)
			.map_err(TransportError::invalid_request)?;

		*request.headers_mut() = headers;

		let _permit = self.semaphore.acquire().await.map_err(|_| TransportError::Closed)?;

		tokio::time::timeout(self.timeout, self.executor.execute(request))
			.await
			.map_err(|_| TransportError::Timeout { after: self.timeout })?
	}
}
impl<E> Debug for BoundedTransport<E>
where
	E: ?Sized + HttpExecutor,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BoundedTransport")
			.field("base", &self.base.as_str())
			.field("permits", &self.permits)
			.field("available_permits", &self.available_permits())
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedExecutor, ScriptedReply};

	fn transport(
		executor: Arc<ScriptedExecutor>,
		permits: usize,
	) -> BoundedTransport<ScriptedExecutor> {
		let base = Url::parse("https://realms.example.com/").expect("Base fixture should parse.");

		BoundedTransport::new(executor, base, permits, StdDuration::from_secs(30))
			.expect("Transport should build.")
	}

	#[tokio::test(start_paused = true)]
	async fn never_exceeds_the_permit_count() {
		let executor = Arc::new(ScriptedExecutor::always(
			ScriptedReply::new(200, "{}").with_delay(StdDuration::from_millis(50)),
		));
		let transport = Arc::new(transport(executor.clone(), 3));
		let mut tasks = Vec::new();

		for _ in 0..12 {
			let transport = transport.clone();

			tasks.push(tokio::spawn(async move {
				transport.send(Method::GET, "worlds", HeaderMap::new(), Vec::new()).await
			}));
		}
		for task in tasks {
			task.await.expect("Task should join.").expect("Scripted call should succeed.");
		}

		assert_eq!(executor.calls(), 12);
		assert_eq!(executor.peak_concurrency(), 3);
		assert_eq!(transport.available_permits(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn slow_calls_time_out_and_release_their_permit() {
		let executor = Arc::new(ScriptedExecutor::always(
			ScriptedReply::new(200, "{}").with_delay(StdDuration::from_secs(60)),
		));
		let transport = transport(executor, 1);
		let err = transport
			.send(Method::GET, "worlds", HeaderMap::new(), Vec::new())
			.await
			.expect_err("A 60 second reply should exceed the 30 second timeout.");

		assert!(matches!(
			err,
			TransportError::Timeout { after } if after == StdDuration::from_secs(30)
		));
		assert_eq!(transport.available_permits(), 1);
	}

	#[tokio::test]
	async fn closed_transport_and_bad_paths_fail_fast() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(200, "{}")));
		let transport = transport(executor.clone(), 2);
		let err = transport
			.send(Method::GET, "http://[oops", HeaderMap::new(), Vec::new())
			.await
			.expect_err("Malformed paths should be rejected.");

		assert!(matches!(err, TransportError::InvalidUrl { .. }));

		transport.close();

		let err = transport
			.send(Method::GET, "worlds", HeaderMap::new(), Vec::new())
			.await
			.expect_err("Closed transports should refuse calls.");

		assert!(matches!(err, TransportError::Closed));
		assert!(transport.is_closed());
		assert_eq!(executor.calls(), 0);
	}

	#[test]
	fn zero_permits_are_rejected() {
		let base = Url::parse("https://realms.example.com/").expect("Base fixture should parse.");
		let err = BoundedTransport::new(
			Arc::new(ScriptedExecutor::default()),
			base,
			0,
			StdDuration::from_secs(1),
		)
		.expect_err("Zero permits should be rejected.");

		assert!(matches!(err, ConfigError::ZeroPermits));
	}
}
