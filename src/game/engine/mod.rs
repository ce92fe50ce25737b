//! Authoritative match state machine
//!
//! The engine is synchronous and clock-free: every entry point takes the
//! current Unix time in milliseconds and events are collected into an outbox
//! that the owning task drains after each step.

mod actions;
#[cfg(test)]
mod tests;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::tick_delta;
use crate::ws::protocol::{
    ClassId, MatchStatus, RoundEndReason, ServerMsg, SpawnInfo, StateUpdate,
};

use super::bot::{BotBody, BotBrain, BotContext, Sighting};
use super::combat::CombatSystem;
use super::combatant::Combatant;
use super::history::{Snapshot, SnapshotHistory};
use super::map::{self, SpawnPoint};
use super::rules::Ruleset;
use super::scheduler::{ScheduledTask, Scheduler, AUTO_START_DELAY_MS, TRANSITION_DELAY_MS};
use super::snapshot::SnapshotBuilder;
use super::{CombatantId, Envelope, JoinRejected, MatchId};

/// Humans plus bots in one match
pub const MAX_COMBATANTS: usize = 12;

/// One match: combatants, rules, round state and timers
pub struct MatchEngine {
    id: MatchId,
    join_code: String,
    status: MatchStatus,
    round: u32,
    round_started_at: u64,
    scores: BTreeMap<CombatantId, u32>,
    rules: Ruleset,
    combatants: BTreeMap<CombatantId, Combatant>,
    host_id: Option<CombatantId>,
    human_capacity: usize,
    history: SnapshotHistory,
    snapshots: SnapshotBuilder,
    scheduler: Scheduler,
    rng: ChaCha8Rng,
    /// Bumped on reset, stale tasks carry an older value
    generation: u64,
    next_join_seq: u64,
    next_reload_token: u64,
    bots_initialized: bool,
    closed: bool,
    outbox: Vec<Envelope>,
}

impl MatchEngine {
    pub fn new(id: MatchId, join_code: String, rules: Ruleset, human_capacity: usize, seed: u64) -> Self {
        Self {
            id,
            join_code,
            status: MatchStatus::Waiting,
            round: 1,
            round_started_at: 0,
            scores: BTreeMap::new(),
            rules,
            combatants: BTreeMap::new(),
            host_id: None,
            human_capacity: human_capacity.min(MAX_COMBATANTS),
            history: SnapshotHistory::default(),
            snapshots: SnapshotBuilder::new(),
            scheduler: Scheduler::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            generation: 0,
            next_join_seq: 0,
            next_reload_token: 0,
            bots_initialized: false,
            closed: false,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn join_code(&self) -> &str {
        &self.join_code
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn scores(&self) -> &BTreeMap<CombatantId, u32> {
        &self.scores
    }

    pub fn rules(&self) -> &Ruleset {
        &self.rules
    }

    pub fn combatants(&self) -> &BTreeMap<CombatantId, Combatant> {
        &self.combatants
    }

    pub fn combatant(&self, id: &CombatantId) -> Option<&Combatant> {
        self.combatants.get(id)
    }

    pub fn host_id(&self) -> Option<CombatantId> {
        self.host_id
    }

    #[cfg(test)]
    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn human_count(&self) -> usize {
        self.combatants.values().filter(|c| !c.is_bot).count()
    }

    /// True once the last human has left
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take every event produced since the last drain
    pub fn drain_events(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Seconds left in the current round
    pub fn time_remaining(&self, now: u64) -> f32 {
        let elapsed = now.saturating_sub(self.round_started_at) as f32 / 1000.0;
        (self.rules.round_time_secs - elapsed).max(0.0)
    }

    /// Seat a human. The first human becomes host.
    pub fn add_human(
        &mut self,
        id: CombatantId,
        nickname: String,
        class_id: ClassId,
        now: u64,
    ) -> Result<(), JoinRejected> {
        if self.closed {
            return Err(JoinRejected::Closed);
        }
        if self.human_count() >= self.human_capacity || self.combatants.len() >= MAX_COMBATANTS {
            return Err(JoinRejected::Full);
        }

        let spawn = random_spawn(&mut self.rng);
        let combatant = Combatant::new(
            id,
            nickname.clone(),
            class_id,
            spawn,
            self.rules.infinite_ammo,
            self.take_join_seq(),
        );
        self.combatants.insert(id, combatant);
        self.scores.insert(id, 0);
        self.host_id.get_or_insert(id);

        info!(
            match_id = %self.id,
            combatant_id = %id,
            humans = self.human_count(),
            "Player joined match"
        );

        if self.combatants.len() > 1 {
            self.broadcast_except(
                id,
                ServerMsg::OpponentJoined {
                    combatant_id: id,
                    nickname,
                },
            );
        }

        match self.status {
            MatchStatus::Waiting if self.occupancy_met() => {
                self.scheduler.schedule(
                    now + AUTO_START_DELAY_MS,
                    ScheduledTask::StartGame {
                        generation: self.generation,
                    },
                );
            }
            MatchStatus::InProgress | MatchStatus::RoundEnd => {
                let start = self.match_start_msg();
                self.send_to(id, start);
                // Stationary combatants would never show up in the deltas
                let state = self.full_state_msg(now);
                self.send_to(id, state);
            }
            _ => {}
        }

        Ok(())
    }

    /// Remove a combatant (disconnect or leave). Closes the match when no
    /// humans remain.
    pub fn remove(&mut self, id: CombatantId, now: u64) {
        let Some(combatant) = self.combatants.remove(&id) else {
            return;
        };
        self.scores.remove(&id);

        info!(
            match_id = %self.id,
            combatant_id = %id,
            nickname = %combatant.nickname,
            "Player left match"
        );
        self.broadcast(ServerMsg::PlayerLeft { combatant_id: id });

        if self.host_id == Some(id) {
            self.host_id = self
                .combatants
                .values()
                .filter(|c| !c.is_bot)
                .min_by_key(|c| c.joined_seq)
                .map(|c| c.id);
            if let Some(host) = self.host_id {
                debug!(match_id = %self.id, host_id = %host, "Host reassigned");
            }
        }

        if self.human_count() == 0 {
            info!(match_id = %self.id, "No humans left, closing match");
            self.closed = true;
            return;
        }

        // A pending rematch may now be unanimous
        self.check_rematch(now);
    }

    /// Run every scheduled task due at `now`
    pub fn run_due(&mut self, now: u64) {
        while let Some(task) = self.scheduler.pop_due(now) {
            if self.closed {
                return;
            }
            match task {
                ScheduledTask::StartGame { generation } => {
                    if generation == self.generation {
                        self.start_game(now);
                    }
                }
                ScheduledTask::NextRound { generation } => {
                    if generation == self.generation && self.status == MatchStatus::RoundEnd {
                        self.round += 1;
                        self.start_round(now);
                    }
                }
                ScheduledTask::Respawn {
                    combatant_id,
                    generation,
                } => self.respawn(combatant_id, generation, now),
                ScheduledTask::AutoRematch { generation } => {
                    if generation == self.generation && self.status == MatchStatus::MatchEnd {
                        self.reset(now);
                    }
                }
                ScheduledTask::ReloadComplete {
                    combatant_id,
                    token,
                } => self.complete_reload(combatant_id, token),
            }
        }
    }

    /// One fixed-rate step; does nothing unless a round is in progress
    pub fn tick(&mut self, now: u64) {
        if self.closed || self.status != MatchStatus::InProgress {
            return;
        }

        if self.time_remaining(now) <= 0.0 {
            self.end_round(RoundEndReason::TimeLimit, now);
            return;
        }

        self.run_bots(now);
        self.history
            .push(Snapshot::capture(now, self.combatants.values()));
        self.broadcast_state(now);
    }

    fn occupancy_met(&self) -> bool {
        self.human_count() >= self.rules.match_mode.min_players()
    }

    fn take_join_seq(&mut self) -> u64 {
        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        seq
    }

    fn start_game(&mut self, now: u64) {
        if self.status != MatchStatus::Waiting {
            return;
        }
        if !self.occupancy_met() {
            debug!(match_id = %self.id, humans = self.human_count(), "Start skipped, not enough players");
            return;
        }

        if self.rules.match_mode.has_bots() && !self.bots_initialized {
            self.init_bots(now);
        }

        self.status = MatchStatus::InProgress;
        info!(
            match_id = %self.id,
            mode = ?self.rules.match_mode,
            combatants = self.combatants.len(),
            "Match started"
        );

        let start = self.match_start_msg();
        self.broadcast(start);
        self.start_round(now);
    }

    fn match_start_msg(&self) -> ServerMsg {
        ServerMsg::MatchStart {
            round: self.round,
            scores: self.scores.clone(),
            rounds_to_win: self.rules.rounds_to_win,
        }
    }

    /// Bots are created once; a reset keeps them
    fn init_bots(&mut self, now: u64) {
        self.bots_initialized = true;

        let room = MAX_COMBATANTS.saturating_sub(self.combatants.len());
        let count = (self.rules.bot_count as usize).min(room);
        for n in 1..=count {
            let id = Uuid::from_u128(self.rng.gen());
            let brain = BotBrain::new(self.rules.bot_difficulty, now, &mut self.rng);
            let spawn = random_spawn(&mut self.rng);
            let seq = self.take_join_seq();
            let bot = Combatant::new_bot(
                id,
                format!("bot{n}"),
                spawn,
                self.rules.infinite_ammo,
                seq,
                brain,
            );
            self.combatants.insert(id, bot);
            self.scores.insert(id, 0);
        }

        info!(match_id = %self.id, bots = count, "Bots added");
    }

    /// Everyone back to full health at a fresh spawn
    fn start_round(&mut self, now: u64) {
        self.status = MatchStatus::InProgress;
        self.round_started_at = now;

        let infinite = self.rules.infinite_ammo;
        let mut spawns = BTreeMap::new();
        for combatant in self.combatants.values_mut() {
            let spawn = random_spawn(&mut self.rng);
            combatant.respawn_at(spawn);
            combatant.refill(infinite);
            if let Some(brain) = combatant.brain.as_mut() {
                brain.reset(now, &mut self.rng);
            }
            spawns.insert(
                combatant.id,
                SpawnInfo {
                    nickname: combatant.nickname.clone(),
                    position: combatant.position,
                    rotation: combatant.rotation,
                },
            );
        }

        info!(match_id = %self.id, round = self.round, "Round started");
        self.broadcast(ServerMsg::RoundStart {
            round: self.round,
            scores: self.scores.clone(),
            rounds_to_win: self.rules.rounds_to_win,
            spawns,
        });
    }

    fn end_round(&mut self, reason: RoundEndReason, now: u64) {
        self.status = MatchStatus::RoundEnd;
        let winner_id = self.round_leader();

        info!(match_id = %self.id, round = self.round, ?reason, "Round ended");
        self.broadcast(ServerMsg::RoundEnd {
            reason,
            winner_id,
            scores: self.scores.clone(),
        });

        self.scheduler.schedule(
            now + TRANSITION_DELAY_MS,
            ScheduledTask::NextRound {
                generation: self.generation,
            },
        );
    }

    /// Sole holder of the top score, if any
    fn round_leader(&self) -> Option<CombatantId> {
        let top = self.scores.values().copied().max()?;
        let mut leaders = self.scores.iter().filter(|(_, score)| **score == top);
        let (id, _) = leaders.next()?;
        leaders.next().is_none().then_some(*id)
    }

    fn end_match(&mut self, winner_id: CombatantId, now: u64) {
        self.status = MatchStatus::MatchEnd;

        info!(match_id = %self.id, winner_id = %winner_id, "Match ended");
        self.broadcast(ServerMsg::MatchEnd {
            winner_id: Some(winner_id),
            scores: self.scores.clone(),
        });

        if self.rules.auto_rematch {
            self.scheduler.schedule(
                now + TRANSITION_DELAY_MS,
                ScheduledTask::AutoRematch {
                    generation: self.generation,
                },
            );
        }
    }

    /// Reset when every human has voted for a rematch
    fn check_rematch(&mut self, now: u64) {
        if self.status != MatchStatus::MatchEnd {
            return;
        }
        let mut humans = self.combatants.values().filter(|c| !c.is_bot).peekable();
        if humans.peek().is_none() {
            return;
        }
        if humans.all(|c| c.wants_rematch) {
            self.reset(now);
        }
    }

    /// New match in the same room: scores, rounds and loadouts start over,
    /// then the game restarts right away if occupancy allows
    fn reset(&mut self, now: u64) {
        self.generation += 1;
        self.scheduler.clear();
        self.status = MatchStatus::Waiting;
        self.round = 1;
        self.scores.values_mut().for_each(|score| *score = 0);

        let infinite = self.rules.infinite_ammo;
        for combatant in self.combatants.values_mut() {
            combatant.reset(infinite);
        }
        self.history.clear();
        self.snapshots.clear();

        info!(match_id = %self.id, generation = self.generation, "Match reset");
        self.broadcast(ServerMsg::MatchReset {
            round: self.round,
            scores: self.scores.clone(),
            rounds_to_win: self.rules.rounds_to_win,
        });

        self.start_game(now);
    }

    fn respawn(&mut self, id: CombatantId, generation: u64, now: u64) {
        if generation != self.generation || self.status != MatchStatus::InProgress {
            return;
        }
        let infinite = self.rules.infinite_ammo;
        let Some(combatant) = self.combatants.get_mut(&id) else {
            return;
        };
        if combatant.alive {
            return;
        }

        let spawn = random_spawn(&mut self.rng);
        combatant.respawn_at(spawn);
        combatant.refill(infinite);
        if let Some(brain) = combatant.brain.as_mut() {
            brain.reset(now, &mut self.rng);
        }
        let (position, rotation) = (combatant.position, combatant.rotation);

        self.broadcast(ServerMsg::PlayerRespawn {
            combatant_id: id,
            position,
            rotation,
        });
    }

    /// Finish a timed reload, unless it was invalidated in the meantime
    fn complete_reload(&mut self, id: CombatantId, token: u64) {
        let infinite = self.rules.infinite_ammo;
        let Some(combatant) = self.combatants.get_mut(&id) else {
            return;
        };
        if !combatant.alive || combatant.reload_token != Some(token) {
            return;
        }
        combatant.reload_token = None;

        let magazine_size = combatant.weapon().magazine_size;
        let amount = CombatSystem::reload_amount(
            combatant.ammo,
            combatant.reserve_ammo,
            magazine_size,
            infinite,
        );
        combatant.ammo += amount;
        if !infinite {
            combatant.reserve_ammo -= amount;
        }
        debug!(combatant_id = %id, amount, "Reload complete");
    }

    fn run_bots(&mut self, now: u64) {
        let bot_ids: Vec<CombatantId> = self
            .combatants
            .values()
            .filter(|c| c.is_bot)
            .map(|c| c.id)
            .collect();

        for bot_id in bot_ids {
            // A bot's kill may have ended the match
            if self.status != MatchStatus::InProgress {
                break;
            }

            let others: Vec<Sighting> = self
                .combatants
                .values()
                .map(|c| Sighting {
                    id: c.id,
                    position: c.position,
                    alive: c.alive,
                    is_bot: c.is_bot,
                })
                .collect();

            let Some(bot) = self.combatants.get_mut(&bot_id) else {
                continue;
            };
            let body = BotBody {
                id: bot.id,
                position: bot.position,
                rotation: bot.rotation,
                ammo: bot.ammo,
                alive: bot.alive,
                reloading: bot.is_reloading(),
            };
            let Some(mut brain) = bot.brain.take() else {
                continue;
            };

            let ctx = BotContext {
                now,
                dt: tick_delta(),
                rules: &self.rules,
                others: &others,
            };
            let intents = brain.update(&body, &ctx, &mut self.rng);

            if let Some(bot) = self.combatants.get_mut(&bot_id) {
                bot.brain = Some(brain);
            }
            self.apply_bot_intents(bot_id, intents, now);
        }
    }

    fn full_state_msg(&self, now: u64) -> ServerMsg {
        ServerMsg::StateUpdate(StateUpdate {
            round: self.round,
            scores: self.scores.clone(),
            time_remaining: self.time_remaining(now),
            rounds_to_win: self.rules.rounds_to_win,
            players: SnapshotBuilder::full_state(self.combatants.values()),
        })
    }

    fn broadcast_state(&mut self, now: u64) {
        let players = self.snapshots.build(self.combatants.values());
        let update = StateUpdate {
            round: self.round,
            scores: self.scores.clone(),
            time_remaining: self.time_remaining(now),
            rounds_to_win: self.rules.rounds_to_win,
            players,
        };
        self.broadcast(ServerMsg::StateUpdate(update));
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        self.outbox.push(Envelope::all(msg));
    }

    fn broadcast_except(&mut self, id: CombatantId, msg: ServerMsg) {
        self.outbox.push(Envelope::except(id, msg));
    }

    fn send_to(&mut self, id: CombatantId, msg: ServerMsg) {
        self.outbox.push(Envelope::only(id, msg));
    }
}

fn random_spawn(rng: &mut ChaCha8Rng) -> &'static SpawnPoint {
    let points = map::spawn_points();
    &points[rng.gen_range(0..points.len())]
}
