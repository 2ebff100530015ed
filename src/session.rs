//! Process-wide realm session: one gateway, the handle caches, and the subscriber tables.
//!
//! The tables are plain owned maps behind one lock. They record which guilds follow a realm's
//! live playerlist, which guilds watch which players, which realms look offline, and which
//! realms should have device information fetched. None of them is persisted.

// std
use std::collections::hash_map::Entry;
// self
use crate::{
	_prelude::*,
	cache::TtlCache,
	error::{ApiError, ConfigError},
	gateway::Gateway,
	http::HttpExecutor,
	obs::{self, OpKind},
};

/// Default lifetime of one handle-cache generation.
pub const DEFAULT_HANDLE_TTL: StdDuration = StdDuration::from_secs(60);

/// Realm id as returned by the Realms API.
pub type RealmId = u64;
/// Discord guild id of a subscriber.
pub type GuildId = u64;

#[derive(Debug, Default)]
struct SessionTables {
	linked: HashMap<RealmId, HashSet<GuildId>>,
	playerlist: HashMap<RealmId, HashSet<GuildId>>,
	watchlist: HashMap<(RealmId, String), HashSet<GuildId>>,
	device_fetch: HashMap<RealmId, HashSet<GuildId>>,
	offline: HashSet<RealmId>,
	dropped: HashSet<RealmId>,
}
impl SessionTables {
	fn forget_realm(&mut self, realm_id: RealmId) {
		self.linked.remove(&realm_id);
		self.playerlist.remove(&realm_id);
		self.watchlist.retain(|(realm, _), _| *realm != realm_id);
		self.device_fetch.remove(&realm_id);
		self.offline.remove(&realm_id);
		self.dropped.remove(&realm_id);
	}
}

fn add_member<K>(map: &mut HashMap<K, HashSet<GuildId>>, key: K, guild_id: GuildId) -> bool
where
	K: Eq + Hash,
{
	map.entry(key).or_default().insert(guild_id)
}

fn remove_member<K>(map: &mut HashMap<K, HashSet<GuildId>>, key: K, guild_id: GuildId) -> bool
where
	K: Eq + Hash,
{
	match map.entry(key) {
		Entry::Occupied(mut entry) => {
			let removed = entry.get_mut().remove(&guild_id);

			if entry.get().is_empty() {
				entry.remove();
			}

			removed
		},
		Entry::Vacant(_) => false,
	}
}

/// What [`RealmSession::unlink_guild`] left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnlinkOutcome {
	/// The guild was linked to the realm.
	pub was_linked: bool,
	/// No guild links the realm anymore; the caller should release it.
	pub realm_orphaned: bool,
}

/// Owner of the gateway, handle caches, and subscriber tables.
pub struct RealmSession<E>
where
	E: ?Sized + HttpExecutor,
{
	gateway: Arc<Gateway<E>>,
	gamertags: TtlCache<String, String>,
	xuids: TtlCache<String, String>,
	tables: Mutex<SessionTables>,
}
impl<E> RealmSession<E>
where
	E: ?Sized + HttpExecutor,
{
	/// Creates a session whose handle caches live for `handle_ttl` per generation.
	///
	/// Must be called inside a Tokio runtime.
	pub fn new(gateway: Arc<Gateway<E>>, handle_ttl: StdDuration) -> Result<Self, ConfigError> {
		Ok(Self {
			gateway,
			gamertags: TtlCache::new(handle_ttl)?,
			xuids: TtlCache::new(handle_ttl)?,
			tables: Mutex::new(SessionTables::default()),
		})
	}

	/// Gateway shared by every caller of this session.
	pub fn gateway(&self) -> &Arc<Gateway<E>> {
		&self.gateway
	}

	/// Remembers `(xuid, gamertag)` pairs in both directions.
	pub fn remember_handles<I, X, G>(&self, pairs: I)
	where
		I: IntoIterator<Item = (X, G)>,
		X: Into<String>,
		G: Into<String>,
	{
		let pairs: Vec<(String, String)> =
			pairs.into_iter().map(|(xuid, gamertag)| (xuid.into(), gamertag.into())).collect();

		self.gamertags.insert_many(
			pairs.iter().map(|(xuid, gamertag)| (gamertag.to_lowercase(), xuid.clone())),
		);
		self.xuids.insert_many(pairs);
	}

	/// Cached XUID for `gamertag`, matched case-insensitively.
	pub fn resolve_xuid(&self, gamertag: &str) -> Option<String> {
		self.gamertags.get(gamertag.to_lowercase().as_str())
	}

	/// Cached gamertag for `xuid`.
	pub fn resolve_gamertag(&self, xuid: &str) -> Option<String> {
		self.xuids.get(xuid)
	}

	/// Records that `guild_id` linked `realm_id`. Newly linked realms start in the offline set
	/// so an offline realm is noticed even if it never reports activity.
	pub fn track_realm(&self, realm_id: RealmId, guild_id: GuildId) {
		let mut tables = self.tables.lock();

		add_member(&mut tables.linked, realm_id, guild_id);
		tables.offline.insert(realm_id);
	}

	/// Guilds linked to `realm_id`.
	pub fn linked_guilds(&self, realm_id: RealmId) -> HashSet<GuildId> {
		self.tables.lock().linked.get(&realm_id).cloned().unwrap_or_default()
	}

	/// Adds `guild_id` to the realm's live playerlist subscribers.
	pub fn subscribe_playerlist(&self, realm_id: RealmId, guild_id: GuildId) -> bool {
		add_member(&mut self.tables.lock().playerlist, realm_id, guild_id)
	}

	/// Removes `guild_id` from the realm's live playerlist subscribers.
	pub fn unsubscribe_playerlist(&self, realm_id: RealmId, guild_id: GuildId) -> bool {
		remove_member(&mut self.tables.lock().playerlist, realm_id, guild_id)
	}

	/// Guilds subscribed to the realm's live playerlist.
	pub fn playerlist_subscribers(&self, realm_id: RealmId) -> HashSet<GuildId> {
		self.tables.lock().playerlist.get(&realm_id).cloned().unwrap_or_default()
	}

	/// Makes `guild_id` watch `xuid` on `realm_id`.
	pub fn watch_player(&self, realm_id: RealmId, xuid: &str, guild_id: GuildId) -> bool {
		add_member(&mut self.tables.lock().watchlist, (realm_id, xuid.to_owned()), guild_id)
	}

	/// Stops `guild_id` watching `xuid` on `realm_id`.
	pub fn unwatch_player(&self, realm_id: RealmId, xuid: &str, guild_id: GuildId) -> bool {
		remove_member(&mut self.tables.lock().watchlist, (realm_id, xuid.to_owned()), guild_id)
	}

	/// Guilds watching `xuid` on `realm_id`.
	pub fn player_watchers(&self, realm_id: RealmId, xuid: &str) -> HashSet<GuildId> {
		self.tables
			.lock()
			.watchlist
			.get(&(realm_id, xuid.to_owned()))
			.cloned()
			.unwrap_or_default()
	}

	/// Marks the realm offline; returns `true` if it was online before.
	pub fn mark_offline(&self, realm_id: RealmId) -> bool {
		self.tables.lock().offline.insert(realm_id)
	}

	/// Marks the realm online, clearing its dropped flag; returns `true` if it was offline.
	pub fn mark_online(&self, realm_id: RealmId) -> bool {
		let mut tables = self.tables.lock();

		tables.dropped.remove(&realm_id);

		tables.offline.remove(&realm_id)
	}

	/// Returns `true` while the realm is in the offline set.
	pub fn is_offline(&self, realm_id: RealmId) -> bool {
		self.tables.lock().offline.contains(&realm_id)
	}

	/// Records that the offline warning for the realm was dropped (already sent).
	pub fn mark_dropped(&self, realm_id: RealmId) -> bool {
		self.tables.lock().dropped.insert(realm_id)
	}

	/// Returns `true` when the realm's offline warning was dropped.
	pub fn is_dropped(&self, realm_id: RealmId) -> bool {
		self.tables.lock().dropped.contains(&realm_id)
	}

	/// Makes `guild_id` ask for device information on `realm_id`.
	pub fn enable_device_fetch(&self, realm_id: RealmId, guild_id: GuildId) -> bool {
		add_member(&mut self.tables.lock().device_fetch, realm_id, guild_id)
	}

	/// Withdraws `guild_id`'s request for device information on `realm_id`.
	pub fn disable_device_fetch(&self, realm_id: RealmId, guild_id: GuildId) -> bool {
		remove_member(&mut self.tables.lock().device_fetch, realm_id, guild_id)
	}

	/// Returns `true` while at least one guild wants device information for the realm.
	pub fn fetches_devices(&self, realm_id: RealmId) -> bool {
		self.tables.lock().device_fetch.contains_key(&realm_id)
	}

	/// Drops every guild-scoped entry for `guild_id` on `realm_id`.
	///
	/// `watched_xuids` are the players the guild was watching; the tables are keyed by realm
	/// and player, so the caller supplies them.
	pub fn unlink_guild<'x, I>(
		&self,
		realm_id: RealmId,
		guild_id: GuildId,
		watched_xuids: I,
	) -> UnlinkOutcome
	where
		I: IntoIterator<Item = &'x str>,
	{
		let mut tables = self.tables.lock();
		let was_linked = remove_member(&mut tables.linked, realm_id, guild_id);

		remove_member(&mut tables.playerlist, realm_id, guild_id);
		remove_member(&mut tables.device_fetch, realm_id, guild_id);

		for xuid in watched_xuids {
			remove_member(&mut tables.watchlist, (realm_id, xuid.to_owned()), guild_id);
		}

		UnlinkOutcome { was_linked, realm_orphaned: !tables.linked.contains_key(&realm_id) }
	}

	/// Leaves the realm through the gateway and forgets every realm-scoped entry.
	///
	/// A 404 answered by the Realms API means the invite is already gone and is not an error.
	/// Every other failure, including credential refresh failures, is returned unchanged and
	/// leaves the tables untouched.
	pub async fn release_realm(&self, realm_id: RealmId) -> Result<()> {
		match self.gateway.leave_realm(realm_id).await {
			Ok(()) => (),
			Err(Error::Api(ApiError { status: 404, .. })) => obs::warn_event(
				OpKind::Request,
				format_args!("realm {realm_id} was already left"),
			),
			Err(err) => return Err(err),
		}

		self.tables.lock().forget_realm(realm_id);

		Ok(())
	}

	/// Cancels cache timers, clears every table, and closes the transport.
	pub fn close(&self) {
		self.gamertags.cancel();
		self.xuids.cancel();
		self.gamertags.clear();
		self.xuids.clear();
		*self.tables.lock() = SessionTables::default();
		self.gateway.close();
	}
}
impl<E> Debug for RealmSession<E>
where
	E: ?Sized + HttpExecutor,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let tables = self.tables.lock();

		f.debug_struct("RealmSession")
			.field("gateway", &self.gateway)
			.field("linked_realms", &tables.linked.len())
			.field("offline_realms", &tables.offline.len())
			.field("cached_handles", &self.xuids.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{
			CountingIssuer, ScriptedExecutor, ScriptedReply, credential, expired_identity,
			scripted_gateway,
		},
		auth::{Credential, CredentialKind},
		error::{AuthRefreshError, TransportError},
	};

	fn session(executor: Arc<ScriptedExecutor>) -> RealmSession<ScriptedExecutor> {
		session_with(
			executor,
			CountingIssuer::new(Duration::hours(1)),
			credential(CredentialKind::Identity, "seed", Duration::hours(1)),
		)
	}

	fn session_with(
		executor: Arc<ScriptedExecutor>,
		issuer: CountingIssuer,
		seed: Credential,
	) -> RealmSession<ScriptedExecutor> {
		let gateway = scripted_gateway(executor, Arc::new(issuer), seed)
			.expect("Scripted gateway should build.");

		RealmSession::new(Arc::new(gateway), DEFAULT_HANDLE_TTL).expect("Session should build.")
	}

	#[tokio::test]
	async fn subscriber_tables_track_membership() {
		let session = session(Arc::new(ScriptedExecutor::default()));

		assert!(session.subscribe_playerlist(1, 10));
		assert!(!session.subscribe_playerlist(1, 10));
		assert!(session.subscribe_playerlist(1, 11));
		assert_eq!(session.playerlist_subscribers(1), HashSet::from([10, 11]));
		assert!(session.unsubscribe_playerlist(1, 10));
		assert!(!session.unsubscribe_playerlist(2, 10));

		assert!(session.watch_player(1, "xuid-a", 10));
		assert_eq!(session.player_watchers(1, "xuid-a"), HashSet::from([10]));
		assert!(session.player_watchers(2, "xuid-a").is_empty());
		assert!(session.unwatch_player(1, "xuid-a", 10));
		assert!(session.player_watchers(1, "xuid-a").is_empty());

		assert!(session.enable_device_fetch(1, 10));
		assert!(session.fetches_devices(1));
		assert!(session.disable_device_fetch(1, 10));
		assert!(!session.fetches_devices(1));
	}

	#[tokio::test]
	async fn offline_and_dropped_flags_reset_when_online() {
		let session = session(Arc::new(ScriptedExecutor::default()));

		session.track_realm(5, 10);

		assert!(session.is_offline(5));
		assert!(session.mark_dropped(5));
		assert!(session.is_dropped(5));
		assert!(session.mark_online(5));
		assert!(!session.is_offline(5));
		assert!(!session.is_dropped(5));
		assert!(session.mark_offline(5));
	}

	#[tokio::test]
	async fn unlinking_the_last_guild_orphans_the_realm() {
		let session = session(Arc::new(ScriptedExecutor::default()));

		session.track_realm(5, 10);
		session.track_realm(5, 11);
		session.subscribe_playerlist(5, 10);
		session.watch_player(5, "xuid-a", 10);
		session.watch_player(5, "xuid-a", 11);
		session.enable_device_fetch(5, 10);

		let outcome = session.unlink_guild(5, 10, ["xuid-a"]);

		assert_eq!(outcome, UnlinkOutcome { was_linked: true, realm_orphaned: false });
		assert!(session.playerlist_subscribers(5).is_empty());
		assert_eq!(session.player_watchers(5, "xuid-a"), HashSet::from([11]));
		assert!(!session.fetches_devices(5));

		let outcome = session.unlink_guild(5, 11, ["xuid-a"]);

		assert_eq!(outcome, UnlinkOutcome { was_linked: true, realm_orphaned: true });
	}

	#[tokio::test]
	async fn release_tolerates_missing_invites_and_forgets_the_realm() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(404, "")));
		let session = session(executor.clone());

		session.track_realm(5, 10);
		session.mark_dropped(5);
		session.release_realm(5).await.expect("A 404 leave should be tolerated.");

		assert!(!session.is_offline(5));
		assert!(!session.is_dropped(5));
		assert!(session.linked_guilds(5).is_empty());
		assert_eq!(executor.recorded()[0].0, "https://realms.example.com/invites/5");
	}

	#[tokio::test]
	async fn release_keeps_the_realm_when_the_refresh_is_rejected() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(204, "")));
		let session = session_with(
			executor.clone(),
			CountingIssuer::new(Duration::hours(1))
				.failing_at(CredentialKind::Identity)
				.with_rejection_status(404),
			expired_identity("seed"),
		);

		session.track_realm(5, 10);

		let err = session.release_realm(5).await.expect_err("Refresh rejections must surface.");

		assert!(matches!(
			err,
			Error::AuthRefresh(AuthRefreshError::Rejected {
				stage: CredentialKind::Identity,
				status: Some(404),
				..
			})
		));
		assert_eq!(executor.calls(), 0);
		assert_eq!(session.linked_guilds(5), HashSet::from([10]));
		assert!(session.is_offline(5));
	}

	#[tokio::test]
	async fn release_surfaces_other_api_failures() {
		let executor = Arc::new(ScriptedExecutor::always(ScriptedReply::new(403, "")));
		let session = session(executor.clone());

		session.track_realm(5, 10);

		let err = session.release_realm(5).await.expect_err("A 403 leave should fail.");

		assert_eq!(err.status(), Some(403));
		assert_eq!(session.linked_guilds(5), HashSet::from([10]));
	}

	#[tokio::test]
	async fn handle_caches_resolve_case_insensitively_and_close_shuts_down() {
		let session = session(Arc::new(ScriptedExecutor::default()));

		session.remember_handles([("2535400000000000", "Steve Builder")]);

		assert_eq!(session.resolve_xuid("steve builder").as_deref(), Some("2535400000000000"));
		assert_eq!(session.resolve_gamertag("2535400000000000").as_deref(), Some("Steve Builder"));

		session.track_realm(5, 10);
		session.close();

		assert!(session.resolve_xuid("Steve Builder").is_none());
		assert!(!session.is_offline(5));

		let err = session.gateway().fetch_realms().await.expect_err("Closed sessions fail fast.");

		assert!(matches!(err, Error::Transport(TransportError::Closed)));
	}
}
