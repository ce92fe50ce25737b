//! Movement validation, line of sight and vertical motion

use glam::Vec3;

use super::map;

/// Ground walking speed (m/s)
pub const WALK_SPEED: f32 = 4.5;
pub const GRAVITY: f32 = 20.0;
pub const JUMP_VELOCITY: f32 = 4.9;
pub const PLAYER_RADIUS: f32 = 0.4;
pub const EYE_HEIGHT: f32 = 1.6;
/// Radius used when validating client movement (slightly forgiving)
pub const MOVE_CHECK_RADIUS: f32 = PLAYER_RADIUS * 0.9;
/// Sample spacing along a line-of-sight segment
pub const LOS_STEP: f32 = 0.5;
/// Radius of each line-of-sight sample
pub const LOS_PROBE_RADIUS: f32 = 0.1;

/// Outcome of validating a reported position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveResolution {
    /// Target accepted as reported
    Accepted(Vec3),
    /// Target collided, slid along one axis
    Slid(Vec3),
    /// Both slides collided, prior position kept
    Blocked,
}

impl MoveResolution {
    /// Final position given the prior one
    pub fn position(self, previous: Vec3) -> Vec3 {
        match self {
            MoveResolution::Accepted(pos) | MoveResolution::Slid(pos) => pos,
            MoveResolution::Blocked => previous,
        }
    }
}

/// Physics helpers
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Validate a movement from `from` to `to`.
    ///
    /// Order is fixed: full move, then X-only slide, then Z-only slide, then
    /// reject. The slide keeps the reported height.
    pub fn resolve_move(from: Vec3, to: Vec3, radius: f32) -> MoveResolution {
        if !map::collides(to, radius) {
            return MoveResolution::Accepted(to);
        }

        let slide_x = Vec3::new(to.x, to.y, from.z);
        if !map::collides(slide_x, radius) {
            return MoveResolution::Slid(slide_x);
        }

        let slide_z = Vec3::new(from.x, to.y, to.z);
        if !map::collides(slide_z, radius) {
            return MoveResolution::Slid(slide_z);
        }

        MoveResolution::Blocked
    }

    /// Eye-height sight line between two feet positions
    pub fn line_of_sight(from: Vec3, to: Vec3) -> bool {
        let eye = Vec3::new(0.0, EYE_HEIGHT, 0.0);
        let start = from + eye;
        let delta = (to + eye) - start;
        let distance = delta.length();

        if distance < 0.1 {
            return true;
        }

        let dir = delta / distance;
        let steps = (distance / LOS_STEP).floor() as u32;

        // Endpoints are skipped, they sit on the combatants themselves
        (1..steps).all(|i| {
            let sample = start + dir * (i as f32 * LOS_STEP);
            !map::collides(sample, LOS_PROBE_RADIUS)
        })
    }

    /// Integrate gravity against the ground plane at y = 0.
    /// Returns (new_y, new_vertical_velocity, grounded).
    pub fn integrate_vertical(y: f32, vel_y: f32, grounded: bool, dt: f32) -> (f32, f32, bool) {
        let vel_y = if grounded { 0.0 } else { vel_y - GRAVITY * dt };
        let next_y = y + vel_y * dt;

        if next_y <= 0.0 {
            (0.0, 0.0, true)
        } else {
            (next_y, vel_y, false)
        }
    }

    /// Unit vector from `from` towards `to`, zero when they coincide
    pub fn direction(from: Vec3, to: Vec3) -> Vec3 {
        (to - from).normalize_or_zero()
    }
}
