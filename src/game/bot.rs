//! Bot decision loop
//!
//! Each bot runs a small patrol/chase/cover state machine once per tick and
//! returns intents. The match applies those intents through the same handlers
//! that process human input, so bots get no special authority.

use glam::Vec3;
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

use crate::ws::protocol::{BotDifficulty, MatchMode, Rotation};

use super::map;
use super::physics::{PhysicsSystem, EYE_HEIGHT, JUMP_VELOCITY, PLAYER_RADIUS, WALK_SPEED};
use super::rules::Ruleset;
use super::CombatantId;

/// How long a line-of-sight result stays valid
const LOS_CACHE_MS: u64 = 500;
/// Patrol waypoint counts as reached inside this distance
const PATROL_ARRIVAL_DISTANCE: f32 = 1.0;
/// Beyond this range a chasing bot closes in, inside it strafes
const CHASE_CLOSE_RANGE: f32 = 15.0;
const COVER_TIMEOUT_MS: u64 = 3_000;
const COLLISION_COOLDOWN_MS: u64 = 500;
/// Bolt-action pacing between bot shots
const BASE_FIRE_DELAY_MS: f32 = 2_000.0;
const FIRE_JITTER_MS: f32 = 250.0;
/// Per-axis deviation of a missed shot, scaled by (1 - accuracy)
const MISS_SPREAD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Patrol,
    Chase,
    /// Placeholder, falls back to chase after a timeout
    Cover,
}

/// Reaction time (ms) and hit probability for a difficulty tier
pub fn skill(difficulty: BotDifficulty) -> (u64, f32) {
    match difficulty {
        BotDifficulty::Easy => (1_500, 0.30),
        BotDifficulty::Medium => (800, 0.5),
        BotDifficulty::Hard => (400, 0.8),
        BotDifficulty::Veteran => (150, 0.95),
    }
}

/// What a bot can observe about another combatant
#[derive(Debug, Clone, Copy)]
pub struct Sighting {
    pub id: CombatantId,
    pub position: Vec3,
    pub alive: bool,
    pub is_bot: bool,
}

/// The bot's own combatant, read fresh every tick
#[derive(Debug, Clone, Copy)]
pub struct BotBody {
    pub id: CombatantId,
    pub position: Vec3,
    pub rotation: Rotation,
    pub ammo: u32,
    pub alive: bool,
    pub reloading: bool,
}

/// Per-tick inputs shared by every bot of a match
pub struct BotContext<'a> {
    pub now: u64,
    pub dt: f32,
    pub rules: &'a Ruleset,
    pub others: &'a [Sighting],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveIntent {
    pub position: Vec3,
    pub rotation: Rotation,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotIntent {
    pub origin: Vec3,
    pub direction: Vec3,
    pub timestamp: u64,
}

/// Actions a bot wants to take this tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotIntents {
    pub movement: Option<MoveIntent>,
    pub shot: Option<ShotIntent>,
    pub reload: bool,
}

/// Decision state attached to a bot combatant
#[derive(Debug, Clone)]
pub struct BotBrain {
    state: BotState,
    target: Option<CombatantId>,
    last_state_change: u64,
    patrol_target: Vec3,
    last_shot_at: u64,
    reaction_ms: u64,
    accuracy: f32,
    /// Horizontal walk direction (y unused)
    move_dir: Vec3,
    look_at: Option<Vec3>,
    vel_y: f32,
    grounded: bool,
    last_move_change: u64,
    move_change_interval: u64,
    last_collision: u64,
    next_jump_at: u64,
    los_cache: HashMap<CombatantId, (bool, u64)>,
}

impl BotBrain {
    pub fn new(difficulty: BotDifficulty, now: u64, rng: &mut impl Rng) -> Self {
        let (reaction_ms, accuracy) = skill(difficulty);
        Self {
            state: BotState::Patrol,
            target: None,
            last_state_change: now,
            patrol_target: random_waypoint(rng),
            last_shot_at: 0,
            reaction_ms,
            accuracy,
            move_dir: Vec3::ZERO,
            look_at: None,
            vel_y: 0.0,
            grounded: true,
            last_move_change: 0,
            move_change_interval: rng.gen_range(1_000..3_000),
            last_collision: 0,
            next_jump_at: now + rng.gen_range(5_000..10_000),
            los_cache: HashMap::new(),
        }
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn target(&self) -> Option<CombatantId> {
        self.target
    }

    /// Re-tune after a difficulty change
    pub fn set_difficulty(&mut self, difficulty: BotDifficulty) {
        (self.reaction_ms, self.accuracy) = skill(difficulty);
    }

    /// Forget pursuit and vertical motion, used when the bot is moved to a spawn
    pub fn reset(&mut self, now: u64, rng: &mut impl Rng) {
        self.change_state(BotState::Patrol, now);
        self.target = None;
        self.look_at = None;
        self.move_dir = Vec3::ZERO;
        self.patrol_target = random_waypoint(rng);
        self.vel_y = 0.0;
        self.grounded = true;
        self.los_cache.clear();
    }

    /// Advance one tick
    pub fn update(&mut self, body: &BotBody, ctx: &BotContext<'_>, rng: &mut impl Rng) -> BotIntents {
        if !body.alive {
            return BotIntents::default();
        }

        self.los_cache
            .retain(|_, (_, checked_at)| ctx.now.saturating_sub(*checked_at) < LOS_CACHE_MS);

        let target = self.acquire_target(body, ctx);

        match self.state {
            BotState::Patrol => self.patrol(body.position, rng),
            BotState::Chase => self.chase(body.position, target, ctx.now, rng),
            BotState::Cover => {
                if ctx.now.saturating_sub(self.last_state_change) > COVER_TIMEOUT_MS {
                    self.change_state(BotState::Chase, ctx.now);
                }
            }
        }

        let (y, vel_y, grounded) =
            PhysicsSystem::integrate_vertical(body.position.y, self.vel_y, self.grounded, ctx.dt);
        self.vel_y = vel_y;
        self.grounded = grounded;

        if self.grounded && ctx.now > self.next_jump_at {
            self.vel_y = JUMP_VELOCITY * ctx.rules.jump_level;
            self.grounded = false;
            self.next_jump_at = ctx.now + rng.gen_range(3_000..8_000);
        }

        let speed = WALK_SPEED * ctx.rules.movement_speed;
        let position = self.step(body.position, y, speed, ctx, rng);

        let yaw = self
            .look_at
            .map(|at| (at.x - position.x).atan2(at.z - position.z))
            .unwrap_or(body.rotation.yaw);

        let mut intents = BotIntents {
            movement: Some(MoveIntent {
                position,
                rotation: Rotation::new(yaw, body.rotation.pitch),
                velocity: Vec3::new(self.move_dir.x * speed, self.vel_y, self.move_dir.z * speed),
            }),
            ..Default::default()
        };

        if body.ammo == 0 {
            intents.reload = !body.reloading;
        } else if let Some(target) = target {
            intents.shot = self.fire(position, target, ctx.now, rng);
        }

        intents
    }

    /// Nearest living, eligible combatant in sight
    fn acquire_target(&mut self, body: &BotBody, ctx: &BotContext<'_>) -> Option<Sighting> {
        let mut best: Option<(Sighting, f32)> = None;

        for other in ctx.others {
            if other.id == body.id || !other.alive {
                continue;
            }
            if ctx.rules.match_mode == MatchMode::CoopBot && other.is_bot {
                continue;
            }

            let distance = body.position.distance(other.position);
            let visible = self.cached_line_of_sight(other.id, body.position, other.position, ctx.now);
            if visible && best.map_or(true, |(_, d)| distance < d) {
                best = Some((*other, distance));
            }
        }

        match best {
            Some((target, _)) => {
                self.target = Some(target.id);
                if self.state == BotState::Patrol {
                    self.change_state(BotState::Chase, ctx.now);
                }
                Some(target)
            }
            None => {
                self.target = None;
                if self.state == BotState::Chase {
                    self.change_state(BotState::Patrol, ctx.now);
                }
                None
            }
        }
    }

    fn cached_line_of_sight(&mut self, id: CombatantId, from: Vec3, to: Vec3, now: u64) -> bool {
        if let Some(&(visible, checked_at)) = self.los_cache.get(&id) {
            if now.saturating_sub(checked_at) < LOS_CACHE_MS {
                return visible;
            }
        }
        let visible = PhysicsSystem::line_of_sight(from, to);
        self.los_cache.insert(id, (visible, now));
        visible
    }

    fn patrol(&mut self, position: Vec3, rng: &mut impl Rng) {
        if position.distance(self.patrol_target) < PATROL_ARRIVAL_DISTANCE {
            self.patrol_target = random_waypoint(rng);
        }
        self.move_dir = horizontal_direction(position, self.patrol_target);
        self.look_at = Some(self.patrol_target);
    }

    fn chase(&mut self, position: Vec3, target: Option<Sighting>, now: u64, rng: &mut impl Rng) {
        let Some(target) = target else {
            return;
        };

        if position.distance(target.position) > CHASE_CLOSE_RANGE {
            self.move_dir = horizontal_direction(position, target.position);
        } else if now.saturating_sub(self.last_move_change) > self.move_change_interval {
            // Strafe, re-rolled on a random interval
            self.move_dir = random_direction(rng);
            self.last_move_change = now;
            self.move_change_interval = rng.gen_range(1_500..3_500);
        }

        self.look_at = Some(target.position + Vec3::Y * EYE_HEIGHT);
    }

    /// Walk one tick, staying put on collision and picking a new heading
    fn step(&mut self, from: Vec3, y: f32, speed: f32, ctx: &BotContext<'_>, rng: &mut impl Rng) -> Vec3 {
        let next = Vec3::new(
            from.x + self.move_dir.x * speed * ctx.dt,
            y,
            from.z + self.move_dir.z * speed * ctx.dt,
        );
        if !map::collides(next, PLAYER_RADIUS) {
            return next;
        }

        if self.state == BotState::Patrol {
            self.patrol_target = random_waypoint(rng);
        } else if ctx.now.saturating_sub(self.last_collision) > COLLISION_COOLDOWN_MS {
            self.move_dir = random_direction(rng);
            self.last_collision = ctx.now;
        }
        Vec3::new(from.x, y, from.z)
    }

    fn fire(&mut self, position: Vec3, target: Sighting, now: u64, rng: &mut impl Rng) -> Option<ShotIntent> {
        let jitter = rng.gen_range(-FIRE_JITTER_MS..FIRE_JITTER_MS);
        let delay = BASE_FIRE_DELAY_MS + jitter + self.reaction_ms as f32;
        if (now.saturating_sub(self.last_shot_at) as f32) <= delay {
            return None;
        }

        // Never through walls, checked fresh at the moment of firing
        if !PhysicsSystem::line_of_sight(position, target.position) {
            return None;
        }

        let origin = position + Vec3::Y * EYE_HEIGHT;
        let aim = self.look_at.unwrap_or(target.position + Vec3::Y * EYE_HEIGHT);
        let mut direction = PhysicsSystem::direction(origin, aim);

        if rng.gen::<f32>() >= self.accuracy {
            let spread = (1.0 - self.accuracy) * MISS_SPREAD;
            direction += Vec3::new(
                (rng.gen::<f32>() - 0.5) * spread,
                (rng.gen::<f32>() - 0.5) * spread,
                (rng.gen::<f32>() - 0.5) * spread,
            );
            direction = direction.normalize_or_zero();
        }

        if direction == Vec3::ZERO {
            return None;
        }

        self.last_shot_at = now;
        Some(ShotIntent {
            origin,
            direction,
            timestamp: now,
        })
    }

    fn change_state(&mut self, state: BotState, now: u64) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Bot state change");
        }
        self.state = state;
        self.last_state_change = now;
    }
}

fn random_waypoint(rng: &mut impl Rng) -> Vec3 {
    let points = map::spawn_points();
    points[rng.gen_range(0..points.len())].position
}

fn random_direction(rng: &mut impl Rng) -> Vec3 {
    Vec3::new(rng.gen_range(-1.0..1.0), 0.0, rng.gen_range(-1.0..1.0))
}

fn horizontal_direction(from: Vec3, to: Vec3) -> Vec3 {
    Vec3::new(to.x - from.x, 0.0, to.z - from.z).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    const NOW: u64 = 100_000;

    fn body_at(position: Vec3) -> BotBody {
        BotBody {
            id: Uuid::new_v4(),
            position,
            rotation: Rotation::default(),
            ammo: 5,
            alive: true,
            reloading: false,
        }
    }

    fn sighting(position: Vec3, is_bot: bool) -> Sighting {
        Sighting {
            id: Uuid::new_v4(),
            position,
            alive: true,
            is_bot,
        }
    }

    fn brain(difficulty: BotDifficulty, rng: &mut ChaCha8Rng) -> BotBrain {
        BotBrain::new(difficulty, NOW, rng)
    }

    #[test]
    fn test_skill_table() {
        assert_eq!(skill(BotDifficulty::Easy), (1_500, 0.30));
        assert_eq!(skill(BotDifficulty::Medium), (800, 0.5));
        assert_eq!(skill(BotDifficulty::Hard), (400, 0.8));
        assert_eq!(skill(BotDifficulty::Veteran), (150, 0.95));
    }

    #[test]
    fn test_targets_nearest_visible() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut bot = brain(BotDifficulty::Medium, &mut rng);
        let body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        let near = sighting(Vec3::new(-12.0, 0.0, -2.0), false);
        let far = sighting(Vec3::new(-12.0, 0.0, 5.0), false);
        let others = [far, near];
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &others,
        };

        bot.update(&body, &ctx, &mut rng);
        assert_eq!(bot.state(), BotState::Chase);
        assert_eq!(bot.target(), Some(near.id));
    }

    #[test]
    fn test_wall_hides_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut bot = brain(BotDifficulty::Medium, &mut rng);
        // Center pillar sits between the two
        let body = body_at(Vec3::new(-5.0, 0.0, 0.0));
        let others = [sighting(Vec3::new(5.0, 0.0, 0.0), false)];
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &others,
        };

        let intents = bot.update(&body, &ctx, &mut rng);
        assert_eq!(bot.state(), BotState::Patrol);
        assert!(bot.target().is_none());
        assert!(intents.shot.is_none());
    }

    #[test]
    fn test_coop_ignores_bots() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut bot = brain(BotDifficulty::Medium, &mut rng);
        let body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        let others = [sighting(Vec3::new(-12.0, 0.0, -2.0), true)];
        let rules = Ruleset {
            match_mode: MatchMode::CoopBot,
            ..Default::default()
        };
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &others,
        };

        bot.update(&body, &ctx, &mut rng);
        assert!(bot.target().is_none());

        let rules = Ruleset {
            match_mode: MatchMode::DeathmatchBot,
            ..Default::default()
        };
        let ctx = BotContext { rules: &rules, ..ctx };
        bot.update(&body, &ctx, &mut rng);
        assert_eq!(bot.target(), Some(others[0].id));
    }

    #[test]
    fn test_fires_towards_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut bot = brain(BotDifficulty::Easy, &mut rng);
        let body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        let target = sighting(Vec3::new(-12.0, 0.0, -4.0), false);
        let others = [target];
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &others,
        };

        let intents = bot.update(&body, &ctx, &mut rng);
        let shot = intents.shot.expect("bot should fire on first sight");
        assert!((shot.direction.length() - 1.0).abs() < 1e-4);
        assert!(shot.direction.dot(Vec3::new(0.0, 0.0, -1.0)) > 0.95);
        assert_eq!(shot.timestamp, NOW);
        assert!((shot.origin.y - EYE_HEIGHT).abs() < 1e-4);

        // Pacing: no second shot on the next tick
        let ctx = BotContext { now: NOW + 33, ..ctx };
        assert!(bot.update(&body, &ctx, &mut rng).shot.is_none());
    }

    #[test]
    fn test_empty_magazine_requests_reload() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut bot = brain(BotDifficulty::Hard, &mut rng);
        let mut body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        body.ammo = 0;
        let others = [sighting(Vec3::new(-12.0, 0.0, -4.0), false)];
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &others,
        };

        let intents = bot.update(&body, &ctx, &mut rng);
        assert!(intents.reload);
        assert!(intents.shot.is_none());

        body.reloading = true;
        assert!(!bot.update(&body, &ctx, &mut rng).reload);
    }

    #[test]
    fn test_dead_bot_does_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut bot = brain(BotDifficulty::Hard, &mut rng);
        let mut body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        body.alive = false;
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &[],
        };
        assert_eq!(bot.update(&body, &ctx, &mut rng), BotIntents::default());
    }

    #[test]
    fn test_jump_leaves_ground() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut bot = brain(BotDifficulty::Medium, &mut rng);
        bot.next_jump_at = 0;
        let mut body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &[],
        };

        let first = bot.update(&body, &ctx, &mut rng).movement.unwrap();
        assert_eq!(first.position.y, 0.0);
        assert!(first.velocity.y > 0.0);

        body.position = first.position;
        let second = bot.update(&body, &ctx, &mut rng).movement.unwrap();
        assert!(second.position.y > 0.0);
    }

    #[test]
    fn test_patrol_walks_towards_waypoint() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut bot = brain(BotDifficulty::Medium, &mut rng);
        bot.next_jump_at = u64::MAX;
        let body = body_at(Vec3::new(-12.0, 0.0, 0.0));
        let waypoint = bot.patrol_target;
        let rules = Ruleset::default();
        let ctx = BotContext {
            now: NOW,
            dt: 1.0 / 30.0,
            rules: &rules,
            others: &[],
        };

        let movement = bot.update(&body, &ctx, &mut rng).movement.unwrap();
        assert!(movement.position.distance(waypoint) < body.position.distance(waypoint));
    }
}
