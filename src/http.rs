//! Transport primitives shared by the token issuer and the Realms transport.
//!
//! [`HttpExecutor`] is the gateway's only dependency on an HTTP stack: one method that turns an
//! [`HttpRequest`] into an [`HttpResponse`]. [`ReqwestHttpClient`] implements it for reqwest,
//! and [`ExecutorHandle`] adapts any executor to `oauth2`'s [`AsyncHttpClient`] so the
//! identity refresh grant reuses the same stack.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpRequest, HttpResponse};
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpExecutor::execute`].
pub type ExecuteFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Minimal capability required from an HTTP client: execute one request, return the raw
/// response.
///
/// Implementations must not retry and must not interpret status codes; non-2xx responses are
/// successful executions. Only failures that prevent a response (DNS, TCP, TLS, IO) map to
/// [`TransportError`].
pub trait HttpExecutor
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and resolves to the raw response.
	fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_>;
}
impl<T> HttpExecutor for Arc<T>
where
	T: ?Sized + HttpExecutor,
{
	fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_> {
		(**self).execute(request)
	}
}

/// Borrowing adapter that exposes an [`HttpExecutor`] as an `oauth2` [`AsyncHttpClient`].
pub struct ExecutorHandle<'e, E>(&'e E)
where
	E: ?Sized + HttpExecutor;
impl<'e, E> ExecutorHandle<'e, E>
where
	E: ?Sized + HttpExecutor,
{
	/// Wraps an executor reference.
	pub fn new(executor: &'e E) -> Self {
		Self(executor)
	}
}
impl<'c, E> AsyncHttpClient<'c> for ExecutorHandle<'_, E>
where
	E: ?Sized + HttpExecutor,
{
	type Error = TransportError;
	type Future = ExecuteFuture<'c>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		self.0.execute(request)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token and Realms endpoints answer directly, so redirects are never followed by the default
/// client; configure any custom client the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds the default client (no redirects).
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpExecutor for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_> {
		Box::pin(async move {
			let request: reqwest::Request =
				request.try_into().map_err(TransportError::invalid_request)?;
			let response = self.0.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{Method, StatusCode};
	// self
	use super::*;
	use crate::_preludet::{ScriptedExecutor, ScriptedReply};

	#[tokio::test]
	async fn handle_forwards_to_executor() {
		let executor = ScriptedExecutor::always(ScriptedReply::new(204, ""));
		let handle = ExecutorHandle::new(&executor);
		let request = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri("https://login.example.com/token")
			.body(Vec::new())
			.expect("Request fixture should build.");
		let response = handle.call(request).await.expect("Scripted executor should answer.");

		assert_eq!(response.status(), StatusCode::NO_CONTENT);
		assert_eq!(executor.calls(), 1);
	}
}
