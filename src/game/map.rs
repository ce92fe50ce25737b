//! Static arena geometry shared with clients
//!
//! The arena is a walled 60x60 square with corner towers and fixed cover.
//! Collision is a flat x/z test against axis-aligned footprints; obstacle
//! height is ignored. Clients load the same definition, it is never sent.

use glam::Vec3;
use serde::Serialize;
use std::f32::consts::{FRAC_PI_2, PI};

/// Full side length of the arena
pub const ARENA_SIZE: f32 = 60.0;
/// Perimeter wall height (visual only, collision is 2D)
pub const WALL_HEIGHT: f32 = 8.0;
/// Extra margin kept between combatants and the perimeter walls
const WALL_MARGIN: f32 = 0.5;

/// Axis-aligned obstacle footprint on the ground plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Obstacle {
    /// Center X
    pub x: f32,
    /// Center Z
    pub z: f32,
    /// Extent along X
    pub width: f32,
    /// Extent along Z
    pub depth: f32,
    /// Visual height
    pub height: f32,
}

impl Obstacle {
    const fn new(x: f32, z: f32, width: f32, depth: f32, height: f32) -> Self {
        Self {
            x,
            z,
            width,
            depth,
            height,
        }
    }

    /// Square tower of the given side length
    const fn tower(x: f32, z: f32, size: f32, height: f32) -> Self {
        Self::new(x, z, size, size, height)
    }

    /// True if a circle of `radius` centred at `point` overlaps this footprint
    pub fn overlaps(&self, point: Vec3, radius: f32) -> bool {
        let dx = (point.x - self.x).abs();
        let dz = (point.z - self.z).abs();
        dx < self.width / 2.0 + radius && dz < self.depth / 2.0 + radius
    }
}

/// Named spawn transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpawnPoint {
    pub name: &'static str,
    pub position: Vec3,
    pub yaw: f32,
}

impl SpawnPoint {
    const fn new(name: &'static str, x: f32, z: f32, yaw: f32) -> Self {
        Self {
            name,
            position: Vec3::new(x, 0.0, z),
            yaw,
        }
    }
}

pub const TOWERS: [Obstacle; 4] = [
    Obstacle::tower(-28.0, -28.0, 4.0, 25.0),
    Obstacle::tower(28.0, -28.0, 4.0, 25.0),
    Obstacle::tower(-28.0, 28.0, 4.0, 25.0),
    Obstacle::tower(28.0, 28.0, 4.0, 25.0),
];

pub const COVER: [Obstacle; 17] = [
    Obstacle::new(-15.0, 10.0, 2.0, 2.0, 4.0),
    Obstacle::new(-15.0, -10.0, 2.0, 2.0, 4.0),
    Obstacle::new(15.0, 10.0, 2.0, 2.0, 4.0),
    Obstacle::new(15.0, -10.0, 2.0, 2.0, 4.0),
    Obstacle::new(0.0, 20.0, 6.0, 2.0, 3.0),
    Obstacle::new(0.0, -20.0, 6.0, 2.0, 3.0),
    Obstacle::new(-20.0, 0.0, 2.0, 6.0, 3.0),
    Obstacle::new(20.0, 0.0, 2.0, 6.0, 3.0),
    Obstacle::new(-8.0, 8.0, 3.0, 3.0, 2.0),
    Obstacle::new(8.0, -8.0, 3.0, 3.0, 2.0),
    Obstacle::new(-8.0, -8.0, 3.0, 3.0, 2.0),
    Obstacle::new(8.0, 8.0, 3.0, 3.0, 2.0),
    // Center pillar
    Obstacle::new(0.0, 0.0, 2.0, 2.0, 5.0),
    Obstacle::new(-22.0, 15.0, 4.0, 1.0, 2.0),
    Obstacle::new(22.0, -15.0, 4.0, 1.0, 2.0),
    Obstacle::new(-5.0, 25.0, 1.0, 4.0, 4.0),
    Obstacle::new(5.0, -25.0, 1.0, 4.0, 4.0),
];

pub const SPAWN_POINTS: [SpawnPoint; 8] = [
    SpawnPoint::new("north_west", -24.0, -24.0, 0.0),
    SpawnPoint::new("north_east", 24.0, -24.0, PI),
    SpawnPoint::new("south_west", -24.0, 24.0, 0.0),
    SpawnPoint::new("south_east", 24.0, 24.0, PI),
    SpawnPoint::new("west", -18.0, 0.0, -FRAC_PI_2),
    SpawnPoint::new("east", 18.0, 0.0, FRAC_PI_2),
    SpawnPoint::new("north", 0.0, -24.0, PI),
    SpawnPoint::new("south", 0.0, 24.0, 0.0),
];

/// Check if a point with a radius collides with the perimeter, a tower or cover
pub fn collides(point: Vec3, radius: f32) -> bool {
    let half = ARENA_SIZE / 2.0;
    let limit = half - radius - WALL_MARGIN;
    if point.x.abs() > limit || point.z.abs() > limit {
        return true;
    }

    TOWERS
        .iter()
        .chain(COVER.iter())
        .any(|obstacle| obstacle.overlaps(point, radius))
}

/// All spawn transforms
pub fn spawn_points() -> &'static [SpawnPoint] {
    &SPAWN_POINTS
}

/// Serializable description of the arena (served to clients for verification)
#[derive(Debug, Clone, Serialize)]
pub struct MapDescription {
    pub size: f32,
    pub wall_height: f32,
    pub towers: &'static [Obstacle],
    pub cover: &'static [Obstacle],
    pub spawn_points: &'static [SpawnPoint],
}

pub fn describe() -> MapDescription {
    MapDescription {
        size: ARENA_SIZE,
        wall_height: WALL_HEIGHT,
        towers: &TOWERS,
        cover: &COVER,
        spawn_points: &SPAWN_POINTS,
    }
}
