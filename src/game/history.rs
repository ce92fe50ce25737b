//! Bounded history of full-position captures for lag compensation

use glam::Vec3;
use std::collections::{BTreeMap, VecDeque};

use crate::ws::protocol::Rotation;

use super::combatant::Combatant;
use super::CombatantId;

/// Oldest capture kept, relative to the newest
pub const HISTORY_MAX_AGE_MS: u64 = 500;
/// Hard cap on retained captures
pub const HISTORY_MAX_LEN: usize = 20;
/// Largest gap between a shot timestamp and a capture that still rewinds
pub const MAX_LAG_COMPENSATION_MS: u64 = 250;

/// One combatant inside a capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEntry {
    pub position: Vec3,
    pub rotation: Rotation,
    pub health: i32,
}

/// World state at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: u64,
    pub entries: BTreeMap<CombatantId, SnapshotEntry>,
}

impl Snapshot {
    pub fn capture<'a>(timestamp: u64, combatants: impl IntoIterator<Item = &'a Combatant>) -> Self {
        let entries = combatants
            .into_iter()
            .map(|c| {
                (
                    c.id,
                    SnapshotEntry {
                        position: c.position,
                        rotation: c.rotation,
                        health: c.health,
                    },
                )
            })
            .collect();
        Self { timestamp, entries }
    }

    pub fn get(&self, id: &CombatantId) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }
}

/// Append-only ring bounded by age and count
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<Snapshot>,
    max_age_ms: u64,
    max_len: usize,
}

impl SnapshotHistory {
    pub fn new(max_age_ms: u64, max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len + 1),
            max_age_ms,
            max_len,
        }
    }

    /// Append a capture and drop whatever falls outside either bound
    pub fn push(&mut self, snapshot: Snapshot) {
        let cutoff = snapshot.timestamp.saturating_sub(self.max_age_ms);
        self.entries.push_back(snapshot);

        while self
            .entries
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.entries.pop_front();
        }
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    /// Capture closest in time to `timestamp`, if within `max_offset_ms`.
    /// Earlier captures win ties.
    pub fn closest(&self, timestamp: u64, max_offset_ms: u64) -> Option<&Snapshot> {
        let mut best: Option<(&Snapshot, u64)> = None;
        for snapshot in &self.entries {
            let diff = snapshot.timestamp.abs_diff(timestamp);
            if best.map_or(true, |(_, best_diff)| diff < best_diff) {
                best = Some((snapshot, diff));
            }
        }

        best.filter(|(_, diff)| *diff <= max_offset_ms)
            .map(|(snapshot, _)| snapshot)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(HISTORY_MAX_AGE_MS, HISTORY_MAX_LEN)
    }
}
