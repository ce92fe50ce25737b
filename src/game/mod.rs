//! Game simulation modules

pub mod bot;
pub mod combat;
pub mod combatant;
pub mod engine;
pub mod history;
pub mod hitscan;
pub mod map;
pub mod r#match;
pub mod physics;
pub mod rules;
pub mod scheduler;
pub mod snapshot;

pub use engine::MatchEngine;
pub use r#match::{GameMatch, MatchHandle};

use glam::Vec3;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::ws::protocol::{ClassId, ClientMsg, Rotation, ServerMsg};

use rules::{Ruleset, RulesetPatch};

pub type CombatantId = Uuid;
pub type MatchId = Uuid;
pub type ConnectionId = Uuid;

/// Who a match event is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Only(CombatantId),
    AllExcept(CombatantId),
}

/// Event leaving a match, filtered per connection by the socket layer
#[derive(Debug, Clone)]
pub struct Envelope {
    pub recipient: Recipient,
    pub msg: ServerMsg,
}

impl Envelope {
    pub fn all(msg: ServerMsg) -> Self {
        Self {
            recipient: Recipient::All,
            msg,
        }
    }

    pub fn only(combatant_id: CombatantId, msg: ServerMsg) -> Self {
        Self {
            recipient: Recipient::Only(combatant_id),
            msg,
        }
    }

    pub fn except(combatant_id: CombatantId, msg: ServerMsg) -> Self {
        Self {
            recipient: Recipient::AllExcept(combatant_id),
            msg,
        }
    }

    pub fn is_for(&self, combatant_id: CombatantId) -> bool {
        match self.recipient {
            Recipient::All => true,
            Recipient::Only(id) => id == combatant_id,
            Recipient::AllExcept(id) => id != combatant_id,
        }
    }
}

/// In-match action, identical for humans and bots
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    Move {
        position: Vec3,
        rotation: Rotation,
        velocity: Vec3,
    },
    Shoot {
        origin: Vec3,
        direction: Vec3,
        timestamp: u64,
    },
    Reload,
    ToggleScope {
        scoped: bool,
    },
    SwitchClass {
        class_id: ClassId,
    },
    UpdateSettings {
        settings: RulesetPatch,
    },
    RequestStart,
    RequestRematch,
}

impl PlayerAction {
    /// In-match part of a client message; lobby and clock messages yield None
    pub fn from_client(msg: ClientMsg) -> Option<Self> {
        let action = match msg {
            ClientMsg::Move {
                position,
                rotation,
                velocity,
            } => PlayerAction::Move {
                position,
                rotation,
                velocity,
            },
            ClientMsg::Shoot {
                origin,
                direction,
                timestamp,
            } => PlayerAction::Shoot {
                origin,
                direction,
                timestamp,
            },
            ClientMsg::Reload => PlayerAction::Reload,
            ClientMsg::ToggleScope { scoped } => PlayerAction::ToggleScope { scoped },
            ClientMsg::SwitchClass { class_id } => PlayerAction::SwitchClass { class_id },
            ClientMsg::UpdateSettings { settings } => PlayerAction::UpdateSettings { settings },
            ClientMsg::RequestStart => PlayerAction::RequestStart,
            ClientMsg::RequestRematch => PlayerAction::RequestRematch,
            ClientMsg::CreateMatch { .. }
            | ClientMsg::JoinMatch { .. }
            | ClientMsg::LeaveMatch
            | ClientMsg::Ping { .. } => return None,
        };
        Some(action)
    }
}

/// Engine-level refusal of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinRejected {
    #[error("match is full")]
    Full,
    #[error("match is closed")]
    Closed,
}

/// Commands delivered to a running match
#[derive(Debug)]
pub enum MatchCommand {
    Join {
        combatant_id: CombatantId,
        nickname: String,
        class_id: ClassId,
        reply: oneshot::Sender<Result<Ruleset, JoinRejected>>,
    },
    Action {
        combatant_id: CombatantId,
        action: PlayerAction,
    },
    Leave {
        combatant_id: CombatantId,
    },
}
