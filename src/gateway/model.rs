//! Realms API payloads.

// self
use crate::_prelude::*;

/// Default permission granted to realm members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
	/// Can join but not build.
	Visitor,
	/// Regular member.
	Member,
	/// Operator with elevated rights.
	Operator,
}

/// Whether the realm accepts players.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
	/// Closed by the owner.
	Closed,
	/// Open for members.
	Open,
}

/// World type of the active slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorldType {
	/// Regular survival/creative world.
	Normal,
}

/// Full realm record as returned by `worlds`, `worlds/{id}`, and the invite endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullRealm {
	/// Realm id.
	pub id: u64,
	/// Subscription id of the realm owner.
	pub remote_subscription_id: String,
	/// Owner display name; often empty.
	#[serde(default)]
	pub owner: Option<String>,
	/// Owner XUID.
	#[serde(default, alias = "ownerUUID")]
	pub owner_uuid: Option<String>,
	/// Realm name.
	pub name: String,
	/// Message of the day.
	#[serde(default)]
	pub motd: Option<String>,
	/// Permission new members receive.
	pub default_permission: Permission,
	/// Open/closed state.
	pub state: State,
	/// Days left on the subscription.
	pub days_left: i64,
	/// Subscription has expired.
	pub expired: bool,
	/// Trial subscription has expired.
	pub expired_trial: bool,
	/// Subscription is in its grace period.
	pub grace_period: bool,
	/// World type of the active slot.
	pub world_type: WorldType,
	/// Member list, when the endpoint includes it.
	#[serde(default)]
	pub players: Option<Vec<Player>>,
	/// Player cap.
	pub max_players: u32,
	/// Active world slot.
	pub active_slot: u32,
	/// Whether the caller is a member.
	pub member: bool,
	/// Xbox club bound to the realm.
	#[serde(default)]
	pub club_id: Option<u64>,
}

/// Response of `worlds`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullWorlds {
	/// Realms the account can see.
	pub servers: Vec<FullRealm>,
}

/// One player entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
	/// XUID of the player.
	pub uuid: String,
	/// Display name; the API usually omits it.
	#[serde(default)]
	pub name: Option<String>,
	/// Operator flag.
	pub operator: bool,
	/// Whether the invite was accepted.
	pub accepted: bool,
	/// Whether the player is online right now.
	pub online: bool,
	/// Permission level.
	pub permission: Permission,
}

/// Live activity for one realm.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmActivity {
	/// Realm id.
	pub id: u64,
	/// Players currently online.
	pub players: Vec<Player>,
	/// Realm is at capacity.
	pub full: bool,
}

/// Response of `activities/live/players`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityList {
	/// Realms with at least one player online.
	pub servers: Vec<RealmActivity>,
}
impl ActivityList {
	/// Returns the activity entry for `realm_id`.
	pub fn find(&self, realm_id: u64) -> Option<&RealmActivity> {
		self.servers.iter().find(|activity| activity.id == realm_id)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn full_realm_accepts_api_casing_and_nulls() {
		let realm: FullRealm = serde_json::from_str(
			r#"{
				"id": 123,
				"remoteSubscriptionId": "sub",
				"owner": "",
				"ownerUUID": "2535400000000000",
				"name": "Home",
				"motd": null,
				"defaultPermission": "MEMBER",
				"state": "OPEN",
				"daysLeft": 12,
				"expired": false,
				"expiredTrial": false,
				"gracePeriod": false,
				"worldType": "NORMAL",
				"players": null,
				"maxPlayers": 11,
				"minigameName": null,
				"minigameId": null,
				"minigameImage": null,
				"activeSlot": 1,
				"slots": null,
				"member": false,
				"clubId": 99,
				"subscriptionRefreshStatus": null
			}"#,
		)
		.expect("Realm fixture should parse.");

		assert_eq!(realm.owner_uuid.as_deref(), Some("2535400000000000"));
		assert_eq!(realm.default_permission, Permission::Member);
		assert_eq!(realm.club_id, Some(99));
		assert!(realm.players.is_none());
	}

	#[test]
	fn activity_lookup_finds_the_realm() {
		let list: ActivityList = serde_json::from_str(
			r#"{"servers":[{"id":7,"full":false,"players":[
				{"uuid":"1","name":null,"operator":false,"accepted":true,"online":true,"permission":"VISITOR"}
			]}]}"#,
		)
		.expect("Activity fixture should parse.");

		assert_eq!(list.find(7).map(|activity| activity.players.len()), Some(1));
		assert!(list.find(8).is_none());
	}
}
