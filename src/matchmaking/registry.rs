//! Match registry - owns live matches and maps connections to their seats

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::rules::{Ruleset, RulesetPatch};
use crate::game::{
    CombatantId, ConnectionId, Envelope, GameMatch, JoinRejected, MatchCommand, MatchEngine,
    MatchHandle, MatchId, PlayerAction,
};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClassId, ServerMsg};

use super::invite;

/// Longest nickname kept, in characters
pub const MAX_NICKNAME_LEN: usize = 16;
pub const HOST_NICKNAME: &str = "Player 1";
pub const GUEST_NICKNAME: &str = "Player 2";

/// Protocol failures reported back to the caller
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No match with that join code")]
    MatchNotFound,

    #[error("Match is full")]
    MatchFull,

    #[error("Already in a match")]
    AlreadyInMatch,

    #[error("Not in a match")]
    NotInMatch,

    #[error("Match has closed")]
    MatchClosed,
}

impl RegistryError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::MatchNotFound => "match_not_found",
            RegistryError::MatchFull => "match_full",
            RegistryError::AlreadyInMatch => "already_in_match",
            RegistryError::NotInMatch => "not_in_match",
            RegistryError::MatchClosed => "match_closed",
        }
    }

    pub fn to_server_msg(&self) -> ServerMsg {
        ServerMsg::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<JoinRejected> for RegistryError {
    fn from(rejected: JoinRejected) -> Self {
        match rejected {
            JoinRejected::Full => RegistryError::MatchFull,
            JoinRejected::Closed => RegistryError::MatchClosed,
        }
    }
}

/// Where a connection is currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub match_id: MatchId,
    pub combatant_id: CombatantId,
}

/// Result of a successful create or join
#[derive(Debug)]
pub struct JoinTicket {
    pub match_id: MatchId,
    pub join_code: String,
    pub combatant_id: CombatantId,
    pub settings: Ruleset,
    /// Subscribed before the join was applied, so nothing addressed to the
    /// new combatant is missed
    pub events: broadcast::Receiver<Envelope>,
}

/// Registry of active matches
pub struct MatchRegistry {
    matches: DashMap<MatchId, MatchHandle>,
    codes: DashMap<String, MatchId>,
    seats: DashMap<ConnectionId, Seat>,
    human_capacity: usize,
}

impl MatchRegistry {
    pub fn new(human_capacity: usize) -> Self {
        Self {
            matches: DashMap::new(),
            codes: DashMap::new(),
            seats: DashMap::new(),
            human_capacity: human_capacity.max(1),
        }
    }

    /// Open a new match hosted by this connection and start its loop
    pub fn create_match(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        nickname: Option<String>,
        class_id: ClassId,
        settings: &RulesetPatch,
    ) -> Result<JoinTicket, RegistryError> {
        if self.seats.contains_key(&connection_id) {
            return Err(RegistryError::AlreadyInMatch);
        }

        let match_id = Uuid::new_v4();
        let join_code = invite::reserve_code(&self.codes, match_id);
        let rules = Ruleset::for_new_match(settings);
        let combatant_id = Uuid::new_v4();
        let nickname = sanitize_nickname(nickname.as_deref(), HOST_NICKNAME);

        let mut engine = MatchEngine::new(
            match_id,
            join_code.clone(),
            rules,
            self.human_capacity,
            rand::random(),
        );
        if let Err(rejected) = engine.add_human(combatant_id, nickname, class_id, unix_millis()) {
            self.codes.remove(&join_code);
            return Err(rejected.into());
        }
        let settings = engine.rules().clone();

        let (game_match, handle) = GameMatch::new(engine);
        let events = handle.subscribe();

        self.matches.insert(match_id, handle);
        self.seats.insert(
            connection_id,
            Seat {
                match_id,
                combatant_id,
            },
        );

        info!(
            match_id = %match_id,
            join_code = %join_code,
            host_id = %combatant_id,
            mode = ?settings.match_mode,
            "Created new match"
        );

        // Spawn match task
        let registry = Arc::clone(self);
        let code = join_code.clone();
        tokio::spawn(async move {
            game_match.run().await;

            // Cleanup after match ends
            registry.remove_match(match_id, &code);
            info!(match_id = %match_id, "Match removed from registry");
        });

        Ok(JoinTicket {
            match_id,
            join_code,
            combatant_id,
            settings,
            events,
        })
    }

    /// Join a live match by its code
    pub async fn join_match(
        &self,
        connection_id: ConnectionId,
        join_code: &str,
        nickname: Option<String>,
        class_id: ClassId,
    ) -> Result<JoinTicket, RegistryError> {
        if self.seats.contains_key(&connection_id) {
            return Err(RegistryError::AlreadyInMatch);
        }

        let handle = self
            .find_by_code(join_code)
            .ok_or(RegistryError::MatchNotFound)?;
        let match_id = handle.id;
        if handle.is_closed() {
            return Err(RegistryError::MatchClosed);
        }
        if handle.human_count() >= self.human_capacity {
            return Err(RegistryError::MatchFull);
        }

        let events = handle.subscribe();
        let combatant_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        handle
            .command_tx
            .send(MatchCommand::Join {
                combatant_id,
                nickname: sanitize_nickname(nickname.as_deref(), GUEST_NICKNAME),
                class_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::MatchClosed)?;

        let settings = reply_rx.await.map_err(|_| RegistryError::MatchClosed)??;

        self.seats.insert(
            connection_id,
            Seat {
                match_id,
                combatant_id,
            },
        );
        info!(match_id = %match_id, combatant_id = %combatant_id, "Player joined match");

        Ok(JoinTicket {
            match_id,
            join_code: handle.join_code.clone(),
            combatant_id,
            settings,
            events,
        })
    }

    /// Route an in-match action to the connection's match
    pub async fn forward(
        &self,
        connection_id: ConnectionId,
        action: PlayerAction,
    ) -> Result<(), RegistryError> {
        let seat = self.seat(&connection_id).ok_or(RegistryError::NotInMatch)?;
        let handle = self.get(&seat.match_id).ok_or(RegistryError::MatchClosed)?;

        handle
            .command_tx
            .send(MatchCommand::Action {
                combatant_id: seat.combatant_id,
                action,
            })
            .await
            .map_err(|_| RegistryError::MatchClosed)
    }

    /// Drop the connection's seat and tell its match
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<Seat, RegistryError> {
        let (_, seat) = self
            .seats
            .remove(&connection_id)
            .ok_or(RegistryError::NotInMatch)?;

        if let Some(handle) = self.get(&seat.match_id) {
            let command = MatchCommand::Leave {
                combatant_id: seat.combatant_id,
            };
            if handle.command_tx.send(command).await.is_err() {
                warn!(match_id = %seat.match_id, "Match loop gone before leave");
            }
        }

        info!(
            match_id = %seat.match_id,
            combatant_id = %seat.combatant_id,
            "Player left match"
        );
        Ok(seat)
    }

    pub fn seat(&self, connection_id: &ConnectionId) -> Option<Seat> {
        self.seats.get(connection_id).map(|entry| *entry)
    }

    pub fn get(&self, match_id: &MatchId) -> Option<MatchHandle> {
        self.matches.get(match_id).map(|entry| entry.clone())
    }

    pub fn find_by_code(&self, join_code: &str) -> Option<MatchHandle> {
        let match_id = *self.codes.get(&invite::normalize(join_code))?;
        self.get(&match_id)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Humans across all matches
    pub fn total_players(&self) -> usize {
        self.matches.iter().map(|entry| entry.human_count()).sum()
    }

    fn remove_match(&self, match_id: MatchId, join_code: &str) {
        self.matches.remove(&match_id);
        self.codes.remove(join_code);
        self.seats.retain(|_, seat| seat.match_id != match_id);
    }
}

/// Trim, drop control characters and cap length; blank names get the fallback
pub fn sanitize_nickname(raw: Option<&str>, fallback: &str) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NICKNAME_LEN)
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}
