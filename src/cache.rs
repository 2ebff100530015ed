//! Generation-scoped TTL table.
//!
//! [`TtlCache`] has no per-entry expiry. The first insert of a generation arms one timer for
//! `expires`; when it fires the whole table is cleared and the cache behaves as newly built.
//! Inserts while the timer is pending merge into the same generation without extending it.

// crates.io
use tokio::{
	runtime::Handle,
	task::JoinHandle,
	time::{self, Instant},
};
// self
use crate::{_prelude::*, error::ConfigError};

/// One cached value and the instant it was written.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
	/// Cached value.
	pub value: V,
	/// Insertion instant (Tokio clock).
	pub inserted_at: Instant,
}

#[derive(Debug)]
struct Timer {
	deadline: Instant,
	generation: u64,
	handle: JoinHandle<()>,
}

#[derive(Debug)]
struct CacheState<K, V> {
	entries: HashMap<K, CacheEntry<V>>,
	timer: Option<Timer>,
	generation: u64,
}
impl<K, V> CacheState<K, V> {
	fn filled(&self, now: Instant) -> bool {
		self.timer.as_ref().is_some_and(|timer| now <= timer.deadline)
	}

	// A deadline that passed before its task ran still ends the generation.
	fn expire_if_due(&mut self, now: Instant) {
		if self.timer.as_ref().is_some_and(|timer| now > timer.deadline) {
			self.reset();
		}
	}

	fn reset(&mut self) {
		if let Some(timer) = self.timer.take() {
			timer.handle.abort();
		}

		self.entries.clear();
	}
}

#[derive(Debug)]
struct CacheInner<K, V> {
	expires: StdDuration,
	state: Mutex<CacheState<K, V>>,
}

/// Key/value table cleared wholesale once per generation.
#[derive(Debug)]
pub struct TtlCache<K, V> {
	inner: Arc<CacheInner<K, V>>,
	runtime: Handle,
}
impl<K, V> TtlCache<K, V>
where
	K: 'static + Send + Eq + Hash,
	V: 'static + Send + Clone,
{
	/// Creates an empty cache whose generations last `expires`.
	///
	/// Must be called from inside a Tokio runtime; the timer task is spawned on it.
	pub fn new(expires: StdDuration) -> Result<Self, ConfigError> {
		let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;

		Ok(Self {
			inner: Arc::new(CacheInner {
				expires,
				state: Mutex::new(CacheState {
					entries: HashMap::new(),
					timer: None,
					generation: 0,
				}),
			}),
			runtime,
		})
	}

	/// Lifetime of one generation.
	pub fn expires(&self) -> StdDuration {
		self.inner.expires
	}

	/// Merges `entries` into the table, arming the timer if none is pending.
	pub fn insert_many<I>(&self, entries: I)
	where
		I: IntoIterator<Item = (K, V)>,
	{
		let now = Instant::now();
		let mut state = self.inner.state.lock();

		state.expire_if_due(now);
		state.entries.extend(
			entries.into_iter().map(|(key, value)| (key, CacheEntry { value, inserted_at: now })),
		);

		if !state.filled(now) {
			self.arm(&mut state, now);
		}
	}

	/// Merges one entry, arming the timer under the same rule as [`TtlCache::insert_many`].
	pub fn insert_one(&self, key: K, value: V) {
		self.insert_many([(key, value)]);
	}

	/// Returns a copy of the value stored for `key`.
	pub fn get<Q>(&self, key: &Q) -> Option<V>
	where
		K: std::borrow::Borrow<Q>,
		Q: ?Sized + Eq + Hash,
	{
		let mut state = self.inner.state.lock();

		state.expire_if_due(Instant::now());
		state.entries.get(key).map(|entry| entry.value.clone())
	}

	/// Returns the value stored for `key`, or `default`.
	pub fn get_or<Q>(&self, key: &Q, default: V) -> V
	where
		K: std::borrow::Borrow<Q>,
		Q: ?Sized + Eq + Hash,
	{
		self.get(key).unwrap_or(default)
	}

	/// Returns `true` while a timer is pending and its deadline has not passed.
	pub fn filled(&self) -> bool {
		self.inner.state.lock().filled(Instant::now())
	}

	/// Aborts the pending timer without clearing the table.
	pub fn cancel(&self) {
		if let Some(timer) = self.inner.state.lock().timer.take() {
			timer.handle.abort();
		}
	}

	/// Number of entries in the current generation.
	pub fn len(&self) -> usize {
		let mut state = self.inner.state.lock();

		state.expire_if_due(Instant::now());

		state.entries.len()
	}

	/// Returns `true` when the table holds nothing.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops every entry and any pending timer.
	pub fn clear(&self) {
		self.inner.state.lock().reset();
	}

	fn arm(&self, state: &mut CacheState<K, V>, now: Instant) {
		state.generation += 1;

		let generation = state.generation;
		let deadline = now + self.inner.expires;
		let weak = Arc::downgrade(&self.inner);
		let handle = self.runtime.spawn(async move {
			time::sleep_until(deadline).await;

			let Some(inner) = weak.upgrade() else {
				return;
			};
			let mut state = inner.state.lock();

			if state.timer.as_ref().is_some_and(|timer| timer.generation == generation) {
				state.timer = None;
				state.entries.clear();
			}
		});

		if let Some(previous) = state.timer.replace(Timer { deadline, generation, handle }) {
			previous.handle.abort();
		}
	}
}
impl<K, V> Drop for TtlCache<K, V> {
	fn drop(&mut self) {
		if let Some(timer) = self.inner.state.lock().timer.take() {
			timer.handle.abort();
		}
	}
}
