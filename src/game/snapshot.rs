//! Delta state building
//!
//! Each combatant's patch is computed against the last value actually sent
//! for it. A field's tracked value only moves when that field is sent, so
//! slow drift below the tolerance still goes out once it adds up.

use glam::Vec3;
use std::collections::{BTreeMap, BTreeSet};

use crate::ws::protocol::{ClassId, CombatantPatch, Rotation};

use super::combatant::Combatant;
use super::CombatantId;

/// Minimum per-axis change before position or rotation is resent
pub const TRANSFORM_TOLERANCE: f32 = 0.01;

/// Last values sent for one combatant
#[derive(Debug, Clone)]
struct SentState {
    position: Vec3,
    rotation: Rotation,
    health: i32,
    alive: bool,
    class_id: ClassId,
}

impl SentState {
    fn of(combatant: &Combatant) -> Self {
        Self {
            position: combatant.position,
            rotation: combatant.rotation,
            health: combatant.health,
            alive: combatant.alive,
            class_id: combatant.class_id,
        }
    }
}

/// Builds per-combatant patches for the state update
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    last_sent: BTreeMap<CombatantId, SentState>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patches for every combatant with something to send. Tracking entries of
    /// combatants not in `combatants` are purged.
    pub fn build<'a>(
        &mut self,
        combatants: impl IntoIterator<Item = &'a Combatant>,
    ) -> BTreeMap<CombatantId, CombatantPatch> {
        let mut patches = BTreeMap::new();
        let mut present = BTreeSet::new();

        for combatant in combatants {
            present.insert(combatant.id);

            let patch = match self.last_sent.get_mut(&combatant.id) {
                Some(sent) => diff(sent, combatant),
                None => {
                    self.last_sent.insert(combatant.id, SentState::of(combatant));
                    full(combatant)
                }
            };

            if !patch.is_empty() {
                patches.insert(combatant.id, patch);
            }
        }

        self.last_sent.retain(|id, _| present.contains(id));
        patches
    }

    /// Full patches for a receiver with no prior record. Leaves tracking alone,
    /// the shared delta stream carries on unchanged.
    pub fn full_state<'a>(
        combatants: impl IntoIterator<Item = &'a Combatant>,
    ) -> BTreeMap<CombatantId, CombatantPatch> {
        combatants.into_iter().map(|c| (c.id, full(c))).collect()
    }

    /// Drop all tracking so the next build sends full state
    pub fn clear(&mut self) {
        self.last_sent.clear();
    }

    pub fn tracked(&self) -> usize {
        self.last_sent.len()
    }
}

fn full(c: &Combatant) -> CombatantPatch {
    CombatantPatch {
        nickname: Some(c.nickname.clone()),
        is_bot: Some(c.is_bot),
        class_id: Some(c.class_id),
        position: Some(c.position),
        rotation: Some(c.rotation),
        health: Some(c.health),
        alive: Some(c.alive),
    }
}

fn diff(sent: &mut SentState, c: &Combatant) -> CombatantPatch {
    let mut patch = CombatantPatch::default();

    if exceeds(sent.position.to_array(), c.position.to_array()) {
        sent.position = c.position;
        patch.position = Some(c.position);
    }
    if exceeds(
        [sent.rotation.yaw, sent.rotation.pitch],
        [c.rotation.yaw, c.rotation.pitch],
    ) {
        sent.rotation = c.rotation;
        patch.rotation = Some(c.rotation);
    }
    if sent.health != c.health {
        sent.health = c.health;
        patch.health = Some(c.health);
    }
    if sent.alive != c.alive {
        sent.alive = c.alive;
        patch.alive = Some(c.alive);
    }
    if sent.class_id != c.class_id {
        sent.class_id = c.class_id;
        patch.nickname = Some(c.nickname.clone());
        patch.is_bot = Some(c.is_bot);
        patch.class_id = Some(c.class_id);
    }

    patch
}

fn exceeds<const N: usize>(previous: [f32; N], current: [f32; N]) -> bool {
    previous
        .iter()
        .zip(current.iter())
        .any(|(a, b)| (a - b).abs() > TRANSFORM_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::SPAWN_POINTS;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn combatant() -> Combatant {
        Combatant::new(
            Uuid::new_v4(),
            "alpha".to_string(),
            ClassId::Sniper,
            &SPAWN_POINTS[2],
            false,
            0,
        )
    }

    #[test]
    fn test_first_broadcast_is_full() {
        let mut builder = SnapshotBuilder::new();
        let c = combatant();
        let patches = builder.build([&c]);
        let patch = &patches[&c.id];
        assert_eq!(patch.nickname.as_deref(), Some("alpha"));
        assert_eq!(patch.is_bot, Some(false));
        assert_eq!(patch.class_id, Some(ClassId::Sniper));
        assert_eq!(patch.position, Some(c.position));
        assert_eq!(patch.health, Some(100));
        assert_eq!(patch.alive, Some(true));
    }

    #[test]
    fn test_full_state_keeps_tracking() {
        let mut builder = SnapshotBuilder::new();
        let c = combatant();
        builder.build([&c]);

        let full = SnapshotBuilder::full_state([&c]);
        assert_eq!(full[&c.id].nickname.as_deref(), Some("alpha"));
        assert_eq!(full[&c.id].position, Some(c.position));
        // The delta stream still sees nothing new
        assert!(builder.build([&c]).is_empty());
    }

    #[test]
    fn test_unchanged_combatant_is_omitted() {
        let mut builder = SnapshotBuilder::new();
        let c = combatant();
        builder.build([&c]);
        assert!(builder.build([&c]).is_empty());
    }

    #[test]
    fn test_small_drift_accumulates() {
        let mut builder = SnapshotBuilder::new();
        let mut c = combatant();
        let start = c.position;
        builder.build([&c]);

        c.position.x = start.x + 0.006;
        assert!(builder.build([&c]).is_empty());

        // Now 0.012 from the last value sent
        c.position.x = start.x + 0.012;
        let patches = builder.build([&c]);
        assert_eq!(patches[&c.id].position, Some(c.position));
        assert!(patches[&c.id].rotation.is_none());
    }

    #[test]
    fn test_health_and_alive_on_any_change() {
        let mut builder = SnapshotBuilder::new();
        let mut c = combatant();
        builder.build([&c]);

        c.take_damage(100);
        let patch = &builder.build([&c])[&c.id];
        assert_eq!(patch.health, Some(0));
        assert_eq!(patch.alive, Some(false));
        assert!(patch.nickname.is_none());
    }

    #[test]
    fn test_class_change_resends_identity() {
        let mut builder = SnapshotBuilder::new();
        let mut c = combatant();
        builder.build([&c]);

        c.switch_class(ClassId::Smg, false);
        let patch = &builder.build([&c])[&c.id];
        assert_eq!(patch.class_id, Some(ClassId::Smg));
        assert_eq!(patch.nickname.as_deref(), Some("alpha"));
        assert_eq!(patch.is_bot, Some(false));
        assert!(patch.position.is_none());
    }

    #[test]
    fn test_departed_combatants_are_purged() {
        let mut builder = SnapshotBuilder::new();
        let a = combatant();
        let b = combatant();
        builder.build([&a, &b]);
        assert_eq!(builder.tracked(), 2);

        builder.build([&a]);
        assert_eq!(builder.tracked(), 1);

        // Coming back counts as new
        let patches = builder.build([&a, &b]);
        assert!(patches[&b.id].nickname.is_some());
    }

    proptest! {
        #[test]
        fn prop_sub_tolerance_changes_send_no_transform(
            moves in prop::collection::vec(
                (-0.009f32..0.009, -0.009f32..0.009, -0.009f32..0.009, -0.009f32..0.009),
                1..20,
            )
        ) {
            let mut builder = SnapshotBuilder::new();
            let mut c = combatant();
            let origin = c.position;
            let facing = c.rotation;
            builder.build([&c]);

            for (dx, dz, dyaw, dpitch) in moves {
                c.position = origin + Vec3::new(dx, 0.0, dz);
                c.rotation = Rotation::new(facing.yaw + dyaw, facing.pitch + dpitch);
                let patches = builder.build([&c]);
                if let Some(patch) = patches.get(&c.id) {
                    prop_assert!(patch.position.is_none());
                    prop_assert!(patch.rotation.is_none());
                }
            }
        }
    }
}
