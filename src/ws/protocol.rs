//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::game::rules::{Ruleset, RulesetPatch};
use crate::game::CombatantId;

/// Weapon classes available to combatants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassId {
    /// Bolt action, one-shot headshots
    #[default]
    Sniper,
    /// Automatic, mid range
    Rifle,
    /// Automatic, close range, fastest movement
    Smg,
}

impl ClassId {
    pub const ALL: [ClassId; 3] = [ClassId::Sniper, ClassId::Rifle, ClassId::Smg];
}

/// Bot skill tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Veteran,
}

/// Match mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    /// Humans only
    #[default]
    Pvp,
    /// Free-for-all with bots, bots fight each other too
    DeathmatchBot,
    /// Bots only hunt humans
    CoopBot,
}

impl MatchMode {
    pub fn has_bots(self) -> bool {
        !matches!(self, MatchMode::Pvp)
    }

    /// Occupancy needed before a match starts on its own
    pub fn min_players(self) -> usize {
        if self.has_bots() {
            1
        } else {
            2
        }
    }
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Waiting,
    InProgress,
    RoundEnd,
    MatchEnd,
}

/// Named body region used for damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitboxKind {
    Head,
    UpperBody,
    LowerBody,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl HitboxKind {
    pub fn is_limb(self) -> bool {
        matches!(
            self,
            HitboxKind::LeftArm | HitboxKind::RightArm | HitboxKind::LeftLeg | HitboxKind::RightLeg
        )
    }
}

/// View rotation in radians
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
}

impl Rotation {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite()
    }
}

/// Why a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundEndReason {
    TimeLimit,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new match and become its host
    CreateMatch {
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        class_id: ClassId,
        #[serde(default)]
        settings: RulesetPatch,
    },

    /// Join an existing match by join code
    JoinMatch {
        join_code: String,
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        class_id: ClassId,
    },

    /// Client-reported movement
    Move {
        position: Vec3,
        rotation: Rotation,
        #[serde(default)]
        velocity: Vec3,
    },

    /// Fire the current weapon
    Shoot {
        origin: Vec3,
        direction: Vec3,
        /// Client clock (Unix millis) at the moment of firing
        timestamp: u64,
    },

    Reload,

    ToggleScope {
        scoped: bool,
    },

    SwitchClass {
        class_id: ClassId,
    },

    /// Host-only ruleset change
    UpdateSettings {
        settings: RulesetPatch,
    },

    RequestStart,

    RequestRematch,

    /// Leave current match (connection stays open)
    LeaveMatch,

    /// Ping for latency measurement and clock sync
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    /// Reply to create_match
    MatchCreated {
        match_id: Uuid,
        join_code: String,
        combatant_id: CombatantId,
        settings: Ruleset,
    },

    /// Reply to join_match
    MatchJoined {
        match_id: Uuid,
        join_code: String,
        combatant_id: CombatantId,
        settings: Ruleset,
    },

    /// Another participant joined
    OpponentJoined {
        combatant_id: CombatantId,
        nickname: String,
    },

    /// A participant left
    PlayerLeft {
        combatant_id: CombatantId,
    },

    MatchStart {
        round: u32,
        scores: BTreeMap<CombatantId, u32>,
        rounds_to_win: u32,
    },

    RoundStart {
        round: u32,
        scores: BTreeMap<CombatantId, u32>,
        rounds_to_win: u32,
        spawns: BTreeMap<CombatantId, SpawnInfo>,
    },

    /// Per-tick delta state
    StateUpdate(StateUpdate),

    HitConfirmed {
        shooter_id: CombatantId,
        victim_id: CombatantId,
        shooter_nickname: String,
        victim_nickname: String,
        hitbox: HitboxKind,
        damage: i32,
        fatal: bool,
        impact_point: Vec3,
        is_shooter_bot: bool,
    },

    PlayerDied {
        victim_id: CombatantId,
        killer_id: CombatantId,
        victim_nickname: String,
        killer_nickname: String,
        hitbox: HitboxKind,
    },

    PlayerRespawn {
        combatant_id: CombatantId,
        position: Vec3,
        rotation: Rotation,
    },

    RoundEnd {
        reason: RoundEndReason,
        winner_id: Option<CombatantId>,
        scores: BTreeMap<CombatantId, u32>,
    },

    MatchEnd {
        winner_id: Option<CombatantId>,
        scores: BTreeMap<CombatantId, u32>,
    },

    MatchReset {
        round: u32,
        scores: BTreeMap<CombatantId, u32>,
        rounds_to_win: u32,
    },

    SettingsUpdated {
        settings: Ruleset,
    },

    /// Audio cue only
    PlayerFired {
        shooter_id: CombatantId,
    },

    ClassSwitched {
        combatant_id: CombatantId,
        class_id: ClassId,
        nickname: String,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

/// Spawn transform and display name sent at round start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnInfo {
    pub nickname: String,
    pub position: Vec3,
    pub rotation: Rotation,
}

/// Delta state broadcast once per tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub round: u32,
    pub scores: BTreeMap<CombatantId, u32>,
    /// Seconds left in the round
    pub time_remaining: f32,
    pub rounds_to_win: u32,
    pub players: BTreeMap<CombatantId, CombatantPatch>,
}

/// Changed fields of one combatant since the last value sent for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<ClassId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
}

impl CombatantPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_msg_tagging() {
        let raw = r#"{"type":"shoot","origin":[0.0,1.6,0.0],"direction":[0.0,0.0,-1.0],"timestamp":1000}"#;
        let msg: ClientMsg = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMsg::Shoot {
                origin, timestamp, ..
            } => {
                assert_eq!(origin, Vec3::new(0.0, 1.6, 0.0));
                assert_eq!(timestamp, 1000);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_create_match_defaults() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"create_match"}"#).unwrap();
        match msg {
            ClientMsg::CreateMatch {
                nickname,
                class_id,
                settings,
            } => {
                assert!(nickname.is_none());
                assert_eq!(class_id, ClassId::Sniper);
                assert_eq!(settings, RulesetPatch::default());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&ClassId::Smg).unwrap(), r#""SMG""#);
        assert_eq!(
            serde_json::to_string(&MatchMode::DeathmatchBot).unwrap(),
            r#""DEATHMATCH_BOT""#
        );
        assert_eq!(
            serde_json::to_string(&HitboxKind::UpperBody).unwrap(),
            r#""UPPER_BODY""#
        );
    }

    #[test]
    fn test_empty_patch_serializes_to_empty_object() {
        let json = serde_json::to_string(&CombatantPatch::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_min_players_by_mode() {
        assert_eq!(MatchMode::Pvp.min_players(), 2);
        assert_eq!(MatchMode::DeathmatchBot.min_players(), 1);
        assert_eq!(MatchMode::CoopBot.min_players(), 1);
    }
}
