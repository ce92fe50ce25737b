//! Combat system - weapon classes, hitboxes, damage

use glam::Vec3;
use serde::Serialize;

use crate::ws::protocol::{ClassId, HitboxKind};

/// Maximum (and respawn) health
pub const MAX_HEALTH: i32 = 100;
/// Ammo value used for both magazine and reserve while infinite ammo is on
pub const INFINITE_AMMO: u32 = 999;
/// Limb hits deal this fraction of body damage (rounded down)
pub const LIMB_DAMAGE_FACTOR: f32 = 0.7;

/// Static weapon definition per class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeaponClass {
    pub id: ClassId,
    pub name: &'static str,
    pub magazine_size: u32,
    pub reserve_ammo: u32,
    /// Minimum time between shots
    pub fire_interval_ms: u64,
    pub automatic: bool,
    pub head_damage: i32,
    pub body_damage: i32,
    /// Reload duration in seconds
    pub reload_secs: f32,
    pub spread: f32,
    pub recoil: f32,
    /// Field of view while scoped
    pub scope_fov: f32,
    /// Movement speed multiplier
    pub speed: f32,
}

const SNIPER: WeaponClass = WeaponClass {
    id: ClassId::Sniper,
    name: "Sniper",
    magazine_size: 5,
    reserve_ammo: 20,
    fire_interval_ms: 1500,
    automatic: false,
    head_damage: 100,
    body_damage: 75,
    reload_secs: 1.5,
    spread: 0.0,
    recoil: 0.02,
    scope_fov: 40.0,
    speed: 1.0,
};

const RIFLE: WeaponClass = WeaponClass {
    id: ClassId::Rifle,
    name: "Assault",
    magazine_size: 30,
    reserve_ammo: 120,
    fire_interval_ms: 150,
    automatic: true,
    head_damage: 25,
    body_damage: 10,
    reload_secs: 2.0,
    spread: 0.03,
    recoil: 0.01,
    scope_fov: 55.0,
    speed: 1.1,
};

const SMG: WeaponClass = WeaponClass {
    id: ClassId::Smg,
    name: "SMG",
    magazine_size: 40,
    reserve_ammo: 160,
    fire_interval_ms: 80,
    automatic: true,
    head_damage: 10,
    body_damage: 5,
    reload_secs: 1.2,
    spread: 0.08,
    recoil: 0.015,
    scope_fov: 60.0,
    speed: 1.25,
};

impl WeaponClass {
    pub fn for_class(class: ClassId) -> &'static WeaponClass {
        match class {
            ClassId::Sniper => &SNIPER,
            ClassId::Rifle => &RIFLE,
            ClassId::Smg => &SMG,
        }
    }

    /// Every class, in wire order
    pub fn all() -> [&'static WeaponClass; 3] {
        ClassId::ALL.map(Self::for_class)
    }

    /// Damage dealt by a hit on the given region
    pub fn damage_for(&self, hitbox: HitboxKind) -> i32 {
        match hitbox {
            HitboxKind::Head => self.head_damage,
            limb if limb.is_limb() => (self.body_damage as f32 * LIMB_DAMAGE_FACTOR).floor() as i32,
            _ => self.body_damage,
        }
    }

    pub fn reload_millis(&self) -> u64 {
        crate::util::time::secs_to_millis(self.reload_secs)
    }
}

/// Static body box in a combatant's local (yaw-rotated) frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub kind: HitboxKind,
    pub size: Vec3,
    pub offset: Vec3,
}

impl Hitbox {
    const fn new(kind: HitboxKind, size: Vec3, offset: Vec3) -> Self {
        Self { kind, size, offset }
    }

    pub fn min(&self) -> Vec3 {
        self.offset - self.size / 2.0
    }

    pub fn max(&self) -> Vec3 {
        self.offset + self.size / 2.0
    }
}

/// The seven hitboxes shared by every combatant, in test order
pub const HITBOXES: [Hitbox; 7] = [
    Hitbox::new(HitboxKind::Head, Vec3::new(0.3, 0.3, 0.3), Vec3::new(0.0, 1.7, 0.0)),
    Hitbox::new(HitboxKind::UpperBody, Vec3::new(0.5, 0.5, 0.3), Vec3::new(0.0, 1.35, 0.0)),
    Hitbox::new(HitboxKind::LowerBody, Vec3::new(0.45, 0.3, 0.28), Vec3::new(0.0, 0.95, 0.0)),
    Hitbox::new(HitboxKind::LeftArm, Vec3::new(0.12, 0.6, 0.12), Vec3::new(-0.35, 1.35, 0.2)),
    Hitbox::new(HitboxKind::RightArm, Vec3::new(0.12, 0.6, 0.12), Vec3::new(0.35, 1.35, 0.1)),
    Hitbox::new(HitboxKind::LeftLeg, Vec3::new(0.18, 0.9, 0.22), Vec3::new(-0.15, 0.45, 0.0)),
    Hitbox::new(HitboxKind::RightLeg, Vec3::new(0.18, 0.9, 0.22), Vec3::new(0.15, 0.45, 0.0)),
];

/// Combat helpers
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: i32, damage: i32) -> (i32, bool) {
        let new_health = (current_health - damage.max(0)).clamp(0, MAX_HEALTH);
        (new_health, new_health <= 0)
    }

    /// Rounds moved from reserve into the magazine by a completed reload
    pub fn reload_amount(magazine: u32, reserve: u32, magazine_size: u32, infinite: bool) -> u32 {
        let needed = magazine_size.saturating_sub(magazine);
        if infinite {
            needed
        } else {
            needed.min(reserve)
        }
    }

    /// Starting (magazine, reserve) for a class
    pub fn loadout(class: ClassId, infinite: bool) -> (u32, u32) {
        if infinite {
            return (INFINITE_AMMO, INFINITE_AMMO);
        }
        let weapon = WeaponClass::for_class(class);
        (weapon.magazine_size, weapon.reserve_ammo)
    }
}
