//! Lag-compensated hitscan
//!
//! A shot is resolved against the capture closest to the shooter's reported
//! time. Each candidate is tested in its own frame: the ray is translated to
//! the candidate's position and rotated by the negative of its yaw, then
//! slab-tested against the seven static hitboxes. The smallest positive ray
//! parameter wins; on an exact tie the first one found is kept.

use glam::Vec3;
use std::collections::BTreeMap;

use crate::ws::protocol::HitboxKind;

use super::combat::{Hitbox, HITBOXES};
use super::combatant::Combatant;
use super::history::{SnapshotHistory, MAX_LAG_COMPENSATION_MS};
use super::CombatantId;

/// Directions closer to zero than this on an axis are treated as parallel
const PARALLEL_EPSILON: f32 = 1e-9;

/// Confirmed hit on a combatant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub victim_id: CombatantId,
    pub hitbox: HitboxKind,
    pub impact_point: Vec3,
    pub distance: f32,
}

/// A shot to resolve
#[derive(Debug, Clone, Copy)]
pub struct ShotQuery {
    pub shooter_id: CombatantId,
    pub origin: Vec3,
    /// Must be normalized
    pub direction: Vec3,
    /// Client clock at fire time (Unix millis)
    pub timestamp: u64,
}

/// Entry and exit parameters of a ray against an AABB (slab method).
/// Returns the hit parameter: entry if in front of the origin, else exit
/// (origin inside the box).
pub fn ray_box(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;

    for axis in 0..3 {
        let (o, d, lo, hi) = (origin[axis], dir[axis], min[axis], max[axis]);
        if d.abs() > PARALLEL_EPSILON {
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        } else if o < lo || o > hi {
            return None;
        }
    }

    if t_max >= t_min && t_max > 0.0 {
        Some(if t_min > 0.0 { t_min } else { t_max })
    } else {
        None
    }
}

/// Rotate a vector about +Y by `angle` radians
fn rotate_y(v: Vec3, angle: f32) -> Vec3 {
    let (sin, cos) = angle.sin_cos();
    Vec3::new(v.x * cos - v.z * sin, v.y, v.x * sin + v.z * cos)
}

/// Test a world-space ray against one hitbox of a combatant standing at
/// `position` facing `yaw`. Returns the ray parameter on a hit.
pub fn intersect_hitbox(origin: Vec3, dir: Vec3, position: Vec3, yaw: f32, hitbox: &Hitbox) -> Option<f32> {
    let local_origin = rotate_y(origin - position, -yaw);
    let local_dir = rotate_y(dir, -yaw);
    ray_box(local_origin, local_dir, hitbox.min(), hitbox.max())
}

/// Resolve a shot. Pure: no randomness and no mutation.
pub fn resolve_shot(
    query: &ShotQuery,
    combatants: &BTreeMap<CombatantId, Combatant>,
    history: &SnapshotHistory,
) -> Option<RayHit> {
    let rewound = history.closest(query.timestamp, MAX_LAG_COMPENSATION_MS);
    let mut closest: Option<RayHit> = None;

    for (id, combatant) in combatants {
        if *id == query.shooter_id || !combatant.alive {
            continue;
        }

        // Combatants missing from the capture (joined after it) use live state
        let (position, yaw) = rewound
            .and_then(|snapshot| snapshot.get(id))
            .map(|entry| (entry.position, entry.rotation.yaw))
            .unwrap_or((combatant.position, combatant.rotation.yaw));

        for hitbox in &HITBOXES {
            let Some(t) = intersect_hitbox(query.origin, query.direction, position, yaw, hitbox) else {
                continue;
            };

            if closest.map_or(true, |best| t < best.distance) {
                closest = Some(RayHit {
                    victim_id: *id,
                    hitbox: hitbox.kind,
                    impact_point: query.origin + query.direction * t,
                    distance: t,
                });
            }
        }
    }

    closest
}
