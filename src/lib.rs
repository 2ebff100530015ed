//! Authenticated gateway to the Minecraft Realms API.
//!
//! Xbox Live credentials are chained and refreshed under a singleflight guard, calls go through a
//! bounded-concurrency transport with status-driven retries, and handle lookups sit in
//! generation-scoped TTL caches.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod issuer;
pub mod oauth;
pub mod obs;
pub mod session;
pub mod store;
pub mod transport;
#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and scripted doubles shared by unit and integration tests; enabled
	//! via `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use oauth2::{HttpRequest, HttpResponse, http::StatusCode};
	// self
	use crate::{
		auth::{Credential, CredentialKind, TokenSecret},
		chain::TokenChain,
		config::{ChainConfig, GatewayConfig},
		error::{AuthRefreshError, ConfigError, TransportError},
		gateway::Gateway,
		http::{ExecuteFuture, HttpExecutor},
		issuer::{CredentialIssuer, IssueFuture},
		store::MemoryStore,
	};

	/// Base URL every scripted gateway points at.
	pub const SCRIPTED_API_BASE: &str = "https://realms.example.com/";

	/// Wires a gateway over scripted doubles: `seed` in a [`MemoryStore`], `issuer` behind the
	/// chain, and `executor` behind the transport.
	pub fn scripted_gateway(
		executor: Arc<ScriptedExecutor>,
		issuer: Arc<CountingIssuer>,
		seed: Credential,
	) -> Result<Gateway<ScriptedExecutor>, ConfigError> {
		let base = Url::parse(SCRIPTED_API_BASE)
			.map_err(|source| ConfigError::InvalidEndpoint { name: "api_base", source })?;
		let store = Arc::new(MemoryStore::seeded(seed.clone()));
		let chain = TokenChain::new(issuer, store, seed, ChainConfig::default())?;

		Gateway::from_parts(executor, Arc::new(chain), GatewayConfig::new(base, "1.20.0"))
	}

	/// Builds a credential of `kind` that expires `ttl` from now.
	pub fn credential(kind: CredentialKind, value: &str, ttl: Duration) -> Credential {
		let issued_at = OffsetDateTime::now_utc() - Duration::minutes(1);
		let mut credential = Credential::new(kind, value, issued_at, issued_at + ttl);

		match kind {
			CredentialKind::Identity =>
				credential.refresh_token = Some(TokenSecret::new(format!("{value}-refresh"))),
			CredentialKind::Service => credential.user_hash = Some("uhs-test".into()),
			CredentialKind::User => (),
		}

		credential
	}

	/// Builds an identity credential that already expired.
	pub fn expired_identity(value: &str) -> Credential {
		credential(CredentialKind::Identity, value, Duration::minutes(-4))
	}

	/// One scripted reply served by [`ScriptedExecutor`].
	#[derive(Clone, Debug)]
	pub struct ScriptedReply {
		/// HTTP status to return.
		pub status: u16,
		/// Raw body to return.
		pub body: String,
		/// Artificial latency applied before replying.
		pub delay: StdDuration,
	}
	impl ScriptedReply {
		/// Reply with a status and body and no latency.
		pub fn new(status: u16, body: impl Into<String>) -> Self {
			Self { status, body: body.into(), delay: StdDuration::ZERO }
		}

		/// Adds latency to the reply.
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = delay;

			self
		}
	}

	/// Executor double that replays scripted replies, repeating the last one once the script
	/// runs out, and records every request plus the peak number of concurrent calls.
	#[derive(Debug, Default)]
	pub struct ScriptedExecutor {
		script: Mutex<VecDeque<ScriptedReply>>,
		last: Mutex<Option<ScriptedReply>>,
		requests: Mutex<Vec<HttpRequest>>,
		in_flight: AtomicUsize,
		peak: AtomicUsize,
	}
	impl ScriptedExecutor {
		/// Creates an executor that serves `replies` in order.
		pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
			Self { script: Mutex::new(replies.into_iter().collect()), ..Default::default() }
		}

		/// Creates an executor that always serves the same reply.
		pub fn always(reply: ScriptedReply) -> Self {
			Self::new([reply])
		}

		/// Returns the number of requests observed so far.
		pub fn calls(&self) -> usize {
			self.requests.lock().len()
		}

		/// Returns a copy of the recorded request URIs and authorization headers.
		pub fn recorded(&self) -> Vec<(String, Option<String>)> {
			self.requests
				.lock()
				.iter()
				.map(|request| {
					let authorization = request
						.headers()
						.get("authorization")
						.and_then(|value| value.to_str().ok())
						.map(str::to_owned);

					(request.uri().to_string(), authorization)
				})
				.collect()
		}

		/// Returns the highest number of calls that were in flight simultaneously.
		pub fn peak_concurrency(&self) -> usize {
			self.peak.load(Ordering::SeqCst)
		}

		fn next_reply(&self) -> Option<ScriptedReply> {
			let mut script = self.script.lock();
			let mut last = self.last.lock();

			if let Some(reply) = script.pop_front() {
				*last = Some(reply.clone());

				return Some(reply);
			}

			last.clone()
		}
	}
	impl HttpExecutor for ScriptedExecutor {
		fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_> {
			Box::pin(async move {
				let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

				self.peak.fetch_max(current, Ordering::SeqCst);
				self.requests.lock().push(request);

				let reply = self.next_reply();

				if let Some(reply) = &reply {
					tokio::time::sleep(reply.delay).await;
				}

				self.in_flight.fetch_sub(1, Ordering::SeqCst);

				let reply = reply.ok_or(TransportError::Closed)?;
				let mut response = HttpResponse::new(reply.body.into_bytes());

				*response.status_mut() = StatusCode::from_u16(reply.status)
					.map_err(|e| TransportError::InvalidRequest { source: Box::new(e) })?;

				Ok(response)
			})
		}
	}

	/// Issuer double that mints sequential credentials and records the order of stage calls.
	#[derive(Debug)]
	pub struct CountingIssuer {
		ttl: Duration,
		delay: StdDuration,
		calls: Mutex<Vec<CredentialKind>>,
		fail_stage: Option<CredentialKind>,
		fail_status: u16,
	}
	impl CountingIssuer {
		/// Creates an issuer whose credentials live for `ttl`.
		pub fn new(ttl: Duration) -> Self {
			Self {
				ttl,
				delay: StdDuration::ZERO,
				calls: Mutex::new(Vec::new()),
				fail_stage: None,
				fail_status: 400,
			}
		}

		/// Adds latency to every issued credential.
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = delay;

			self
		}

		/// Makes every call for `stage` fail with a rejection.
		pub fn failing_at(mut self, stage: CredentialKind) -> Self {
			self.fail_stage = Some(stage);

			self
		}

		/// Sets the status carried by scripted rejections (400 by default).
		pub fn with_rejection_status(mut self, status: u16) -> Self {
			self.fail_status = status;

			self
		}

		/// Returns the ordered list of stage calls.
		pub fn calls(&self) -> Vec<CredentialKind> {
			self.calls.lock().clone()
		}

		/// Returns how many times `stage` was issued.
		pub fn count(&self, stage: CredentialKind) -> usize {
			self.calls.lock().iter().filter(|kind| **kind == stage).count()
		}

		fn issue(&self, kind: CredentialKind) -> IssueFuture<'_> {
			Box::pin(async move {
				tokio::time::sleep(self.delay).await;

				let sequence = {
					let mut calls = self.calls.lock();

					calls.push(kind);
					calls.iter().filter(|stage| **stage == kind).count()
				};

				if self.fail_stage == Some(kind) {
					return Err(AuthRefreshError::Rejected {
						stage: kind,
						status: Some(400),
						reason: "scripted rejection".into(),
					});
				}

				Ok(credential(kind, &format!("{}-{sequence}", kind.as_str()), self.ttl))
			})
		}
	}
	impl CredentialIssuer for CountingIssuer {
		fn refresh_identity<'a>(&'a self, _identity: &'a Credential) -> IssueFuture<'a> {
			self.issue(CredentialKind::Identity)
		}

		fn request_user<'a>(&'a self, _identity: &'a Credential) -> IssueFuture<'a> {
			self.issue(CredentialKind::User)
		}

		fn request_service<'a>(&'a self, _user: &'a Credential) -> IssueFuture<'a> {
			self.issue(CredentialKind::Service)
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
