//! Action handlers
//!
//! State errors (dead or unknown combatant, no ammo, wrong phase) are dropped
//! without a reply. Movement is corrected rather than rejected.

use glam::Vec3;
use tracing::{debug, info};

use crate::game::bot::BotIntents;
use crate::game::hitscan::{resolve_shot, ShotQuery};
use crate::game::physics::{MoveResolution, PhysicsSystem, MOVE_CHECK_RADIUS};
use crate::game::rules::RulesetPatch;
use crate::game::scheduler::{ScheduledTask, TRANSITION_DELAY_MS};
use crate::game::{CombatantId, PlayerAction};
use crate::ws::protocol::{ClassId, HitboxKind, MatchStatus, Rotation, ServerMsg};

use super::MatchEngine;

impl MatchEngine {
    /// Apply one action from a human or bot
    pub fn handle_action(&mut self, id: CombatantId, action: PlayerAction, now: u64) {
        if self.closed {
            return;
        }
        if !self.combatants.contains_key(&id) {
            debug!(match_id = %self.id, combatant_id = %id, "Action from unknown combatant dropped");
            return;
        }

        match action {
            PlayerAction::Move {
                position,
                rotation,
                velocity,
            } => self.handle_move(id, position, rotation, velocity),
            PlayerAction::Shoot {
                origin,
                direction,
                timestamp,
            } => self.handle_shoot(id, origin, direction, timestamp, now),
            PlayerAction::Reload => self.handle_reload(id, now),
            PlayerAction::ToggleScope { scoped } => self.handle_toggle_scope(id, scoped),
            PlayerAction::SwitchClass { class_id } => self.handle_switch_class(id, class_id, now),
            PlayerAction::UpdateSettings { settings } => self.handle_update_settings(id, &settings),
            PlayerAction::RequestStart => self.handle_request_start(id, now),
            PlayerAction::RequestRematch => self.handle_rematch_request(id, now),
        }
    }

    pub(super) fn apply_bot_intents(&mut self, id: CombatantId, intents: BotIntents, now: u64) {
        if let Some(movement) = intents.movement {
            self.handle_move(id, movement.position, movement.rotation, movement.velocity);
        }
        if intents.reload {
            self.handle_reload(id, now);
        }
        if let Some(shot) = intents.shot {
            self.handle_shoot(id, shot.origin, shot.direction, shot.timestamp, now);
        }
    }

    fn handle_move(&mut self, id: CombatantId, position: Vec3, rotation: Rotation, velocity: Vec3) {
        if !position.is_finite() || !rotation.is_finite() {
            debug!(combatant_id = %id, "Non-finite move dropped");
            return;
        }
        let Some(combatant) = self.combatants.get_mut(&id) else {
            return;
        };
        if !combatant.alive {
            return;
        }

        let resolution = PhysicsSystem::resolve_move(combatant.position, position, MOVE_CHECK_RADIUS);
        if resolution == MoveResolution::Blocked {
            debug!(combatant_id = %id, "Move blocked, keeping prior position");
        }
        combatant.position = resolution.position(combatant.position);
        combatant.rotation = rotation;
        combatant.velocity = if velocity.is_finite() { velocity } else { Vec3::ZERO };
    }

    fn handle_shoot(&mut self, id: CombatantId, origin: Vec3, direction: Vec3, timestamp: u64, now: u64) {
        if self.status != MatchStatus::InProgress {
            return;
        }
        if !origin.is_finite() || !direction.is_finite() {
            debug!(combatant_id = %id, "Non-finite shot dropped");
            return;
        }
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return;
        }

        let infinite = self.rules.infinite_ammo;
        let Some(shooter) = self.combatants.get_mut(&id) else {
            return;
        };
        if !shooter.alive {
            return;
        }
        if shooter.is_reloading() {
            debug!(combatant_id = %id, "Shot while reloading dropped");
            return;
        }
        if !infinite {
            if shooter.ammo == 0 {
                debug!(combatant_id = %id, "Shot with empty magazine dropped");
                return;
            }
            shooter.ammo -= 1;
        }

        let weapon = shooter.weapon();
        let shooter_nickname = shooter.nickname.clone();
        let is_shooter_bot = shooter.is_bot;

        self.broadcast(ServerMsg::PlayerFired { shooter_id: id });

        let query = ShotQuery {
            shooter_id: id,
            origin,
            direction,
            timestamp,
        };
        let Some(hit) = resolve_shot(&query, &self.combatants, &self.history) else {
            return;
        };

        let damage = weapon.damage_for(hit.hitbox);
        let Some(victim) = self.combatants.get_mut(&hit.victim_id) else {
            return;
        };
        let fatal = victim.take_damage(damage);
        let victim_nickname = victim.nickname.clone();

        self.broadcast(ServerMsg::HitConfirmed {
            shooter_id: id,
            victim_id: hit.victim_id,
            shooter_nickname: shooter_nickname.clone(),
            victim_nickname: victim_nickname.clone(),
            hitbox: hit.hitbox,
            damage,
            fatal,
            impact_point: hit.impact_point,
            is_shooter_bot,
        });

        if fatal {
            self.record_kill(id, hit.victim_id, hit.hitbox, shooter_nickname, victim_nickname, now);
        }
    }

    /// Score the kill, then end the match or queue the victim's respawn
    fn record_kill(
        &mut self,
        killer_id: CombatantId,
        victim_id: CombatantId,
        hitbox: HitboxKind,
        killer_nickname: String,
        victim_nickname: String,
        now: u64,
    ) {
        let score = self.scores.entry(killer_id).or_insert(0);
        *score += 1;
        let score = *score;

        info!(
            match_id = %self.id,
            killer_id = %killer_id,
            victim_id = %victim_id,
            ?hitbox,
            score,
            "Kill"
        );
        self.broadcast(ServerMsg::PlayerDied {
            victim_id,
            killer_id,
            victim_nickname,
            killer_nickname,
            hitbox,
        });

        if score >= self.rules.rounds_to_win {
            self.end_match(killer_id, now);
        } else {
            self.scheduler.schedule(
                now + TRANSITION_DELAY_MS,
                ScheduledTask::Respawn {
                    combatant_id: victim_id,
                    generation: self.generation,
                },
            );
        }
    }

    fn handle_reload(&mut self, id: CombatantId, now: u64) {
        let infinite = self.rules.infinite_ammo;
        let Some(combatant) = self.combatants.get_mut(&id) else {
            return;
        };
        if !combatant.alive || combatant.is_reloading() {
            return;
        }
        let weapon = combatant.weapon();
        if combatant.ammo >= weapon.magazine_size {
            return;
        }
        if !infinite && combatant.reserve_ammo == 0 {
            return;
        }

        let token = self.next_reload_token;
        self.next_reload_token += 1;
        combatant.reload_token = Some(token);

        self.scheduler.schedule(
            now + weapon.reload_millis(),
            ScheduledTask::ReloadComplete {
                combatant_id: id,
                token,
            },
        );
        debug!(combatant_id = %id, token, "Reload started");
    }

    fn handle_toggle_scope(&mut self, id: CombatantId, scoped: bool) {
        if let Some(combatant) = self.combatants.get_mut(&id) {
            if combatant.alive {
                combatant.scoped = scoped;
            }
        }
    }

    fn handle_switch_class(&mut self, id: CombatantId, class_id: ClassId, now: u64) {
        let infinite = self.rules.infinite_ammo;
        let Some(combatant) = self.combatants.get_mut(&id) else {
            return;
        };
        if !combatant.alive || combatant.class_id == class_id {
            return;
        }

        combatant.switch_class(class_id, infinite);
        let nickname = combatant.nickname.clone();

        self.broadcast(ServerMsg::ClassSwitched {
            combatant_id: id,
            class_id,
            nickname,
        });
        self.broadcast_state(now);
    }

    fn handle_update_settings(&mut self, id: CombatantId, patch: &RulesetPatch) {
        if self.host_id != Some(id) {
            debug!(match_id = %self.id, combatant_id = %id, "Settings update from non-host dropped");
            return;
        }

        let next = self.rules.merge(patch);
        let ammo_changed = next.infinite_ammo != self.rules.infinite_ammo;
        let difficulty_changed = next.bot_difficulty != self.rules.bot_difficulty;
        self.rules = next;

        if ammo_changed {
            let infinite = self.rules.infinite_ammo;
            for combatant in self.combatants.values_mut() {
                combatant.refill(infinite);
            }
        }
        if difficulty_changed {
            let difficulty = self.rules.bot_difficulty;
            for brain in self.combatants.values_mut().filter_map(|c| c.brain.as_mut()) {
                brain.set_difficulty(difficulty);
            }
        }

        info!(match_id = %self.id, rules = ?self.rules, "Settings updated");
        self.broadcast(ServerMsg::SettingsUpdated {
            settings: self.rules.clone(),
        });
    }

    fn handle_request_start(&mut self, id: CombatantId, now: u64) {
        if self.host_id != Some(id) {
            debug!(match_id = %self.id, combatant_id = %id, "Start request from non-host dropped");
            return;
        }
        self.start_game(now);
    }

    fn handle_rematch_request(&mut self, id: CombatantId, now: u64) {
        if self.status != MatchStatus::MatchEnd {
            return;
        }
        if let Some(combatant) = self.combatants.get_mut(&id) {
            if combatant.is_bot {
                return;
            }
            combatant.wants_rematch = true;
        }
        self.check_rematch(now);
    }
}
