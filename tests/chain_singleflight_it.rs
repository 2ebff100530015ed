// crates.io
use tokio::task::JoinSet;
// self
use realms_gateway::{
	_preludet::*,
	auth::CredentialKind,
	chain::TokenChain,
	config::ChainConfig,
	store::MemoryStore,
};

fn build_chain(issuer: Arc<CountingIssuer>, seed_ttl: Duration) -> Arc<TokenChain> {
	let seed = credential(CredentialKind::Identity, "seed", seed_ttl);
	let store = Arc::new(MemoryStore::seeded(seed.clone()));

	Arc::new(
		TokenChain::new(issuer, store, seed, ChainConfig::default())
			.expect("Chain fixture should build."),
	)
}

async fn race(chain: &Arc<TokenChain>, callers: usize, force: bool) -> Vec<String> {
	let mut set = JoinSet::new();

	for _ in 0..callers {
		let chain = chain.clone();

		set.spawn(async move { chain.ensure_valid(force).await });
	}

	let mut values = Vec::with_capacity(callers);

	while let Some(joined) = set.join_next().await {
		let service = joined
			.expect("Caller task should not panic.")
			.expect("Concurrent callers should receive a credential.");

		values.push(service.value.expose().to_owned());
	}

	values
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_refresh_sequence() {
	let issuer =
		Arc::new(CountingIssuer::new(Duration::hours(1)).with_delay(StdDuration::from_millis(50)));
	let chain = build_chain(issuer.clone(), Duration::hours(1));
	let values = race(&chain, 16, false).await;

	assert!(values.iter().all(|value| value == "service-1"));
	assert_eq!(issuer.calls(), vec![CredentialKind::User, CredentialKind::Service]);
	assert_eq!(chain.generation(), 1);
	assert_eq!(chain.metrics().sequences(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_forced_refreshes_collapse_into_one() {
	let issuer =
		Arc::new(CountingIssuer::new(Duration::hours(1)).with_delay(StdDuration::from_millis(50)));
	let chain = build_chain(issuer.clone(), Duration::hours(1));

	chain.ensure_valid(false).await.expect("Initial sequence should succeed.");

	let values = race(&chain, 8, true).await;

	assert!(values.iter().all(|value| value == "service-2"));
	assert_eq!(issuer.count(CredentialKind::Identity), 1);
	assert_eq!(issuer.count(CredentialKind::User), 2);
	assert_eq!(issuer.count(CredentialKind::Service), 2);
	assert_eq!(chain.generation(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_sequence_does_not_advance_the_generation() {
	let issuer = Arc::new(
		CountingIssuer::new(Duration::hours(1)).failing_at(CredentialKind::Service),
	);
	let chain = build_chain(issuer.clone(), Duration::hours(1));
	let err = chain.ensure_valid(false).await.expect_err("Service stage is scripted to fail.");

	assert!(matches!(err, Error::AuthRefresh(_)));
	assert_eq!(chain.generation(), 0);
	assert!(chain.current(CredentialKind::User).is_some());
	assert!(chain.current(CredentialKind::Service).is_none());

	// The still-valid user credential is reused; only the service stage is retried.
	chain.ensure_valid(false).await.expect_err("Service stage keeps failing.");

	assert_eq!(issuer.count(CredentialKind::User), 1);
	assert_eq!(issuer.count(CredentialKind::Service), 2);
}
