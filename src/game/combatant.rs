//! Combatant state (authoritative)

use glam::Vec3;

use crate::ws::protocol::{ClassId, Rotation};

use super::bot::BotBrain;
use super::combat::{CombatSystem, WeaponClass, MAX_HEALTH};
use super::map::SpawnPoint;
use super::CombatantId;

/// One occupant of a match, human or bot
#[derive(Debug, Clone)]
pub struct Combatant {
    pub id: CombatantId,
    pub nickname: String,
    pub is_bot: bool,

    // Transform
    pub position: Vec3,
    pub rotation: Rotation,
    pub velocity: Vec3,

    // Vitals
    pub health: i32,
    pub alive: bool,

    // Loadout
    pub class_id: ClassId,
    pub ammo: u32,
    pub reserve_ammo: u32,
    pub scoped: bool,
    /// Token of the reload in flight, if any
    pub reload_token: Option<u64>,

    // Bookkeeping
    pub wants_rematch: bool,
    /// Order of arrival, used to pick the next host
    pub joined_seq: u64,

    /// Decision loop for bot combatants
    pub brain: Option<Box<BotBrain>>,
}

impl Combatant {
    pub fn new(
        id: CombatantId,
        nickname: String,
        class_id: ClassId,
        spawn: &SpawnPoint,
        infinite_ammo: bool,
        joined_seq: u64,
    ) -> Self {
        let (ammo, reserve_ammo) = CombatSystem::loadout(class_id, infinite_ammo);
        Self {
            id,
            nickname,
            is_bot: false,
            position: spawn.position,
            rotation: Rotation::new(spawn.yaw, 0.0),
            velocity: Vec3::ZERO,
            health: MAX_HEALTH,
            alive: true,
            class_id,
            ammo,
            reserve_ammo,
            scoped: false,
            reload_token: None,
            wants_rematch: false,
            joined_seq,
            brain: None,
        }
    }

    /// Bots always carry the sniper class
    pub fn new_bot(
        id: CombatantId,
        nickname: String,
        spawn: &SpawnPoint,
        infinite_ammo: bool,
        joined_seq: u64,
        brain: BotBrain,
    ) -> Self {
        let mut bot = Self::new(id, nickname, ClassId::Sniper, spawn, infinite_ammo, joined_seq);
        bot.is_bot = true;
        bot.brain = Some(Box::new(brain));
        bot
    }

    pub fn weapon(&self) -> &'static WeaponClass {
        WeaponClass::for_class(self.class_id)
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_token.is_some()
    }

    /// Apply damage, returns true if this hit was fatal
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if !self.alive {
            return false;
        }
        let (health, dead) = CombatSystem::apply_damage(self.health, amount);
        self.health = health;
        if dead {
            self.alive = false;
            self.scoped = false;
            self.reload_token = None;
        }
        dead
    }

    /// Restore the class magazine and reserve
    pub fn refill(&mut self, infinite_ammo: bool) {
        let (ammo, reserve) = CombatSystem::loadout(self.class_id, infinite_ammo);
        self.ammo = ammo;
        self.reserve_ammo = reserve;
        self.reload_token = None;
    }

    /// Change class and take its fresh loadout
    pub fn switch_class(&mut self, class_id: ClassId, infinite_ammo: bool) {
        self.class_id = class_id;
        self.scoped = false;
        self.refill(infinite_ammo);
    }

    /// Move to a spawn with full health
    pub fn respawn_at(&mut self, spawn: &SpawnPoint) {
        self.position = spawn.position;
        self.rotation = Rotation::new(spawn.yaw, 0.0);
        self.velocity = Vec3::ZERO;
        self.health = MAX_HEALTH;
        self.alive = true;
        self.scoped = false;
    }

    /// Full reset for a new match in the same room
    pub fn reset(&mut self, infinite_ammo: bool) {
        self.health = MAX_HEALTH;
        self.alive = true;
        self.scoped = false;
        self.wants_rematch = false;
        self.refill(infinite_ammo);
    }

    /// Checks the health and ammo bounds every combatant must satisfy
    pub fn within_bounds(&self, infinite_ammo: bool) -> bool {
        let health_ok = (0..=MAX_HEALTH).contains(&self.health);
        if infinite_ammo {
            return health_ok;
        }
        let weapon = self.weapon();
        health_ok && self.ammo <= weapon.magazine_size && self.reserve_ammo <= weapon.reserve_ammo
    }
}
