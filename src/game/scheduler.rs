//! Deferred one-shot tasks of a match
//!
//! Tasks carry ids only. They are re-validated against the match when they
//! fire, since the combatant may have left or the match reset meanwhile.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::CombatantId;

/// Delay before respawn, next round and auto-rematch
pub const TRANSITION_DELAY_MS: u64 = 2_000;
/// Delay between occupancy being met and the automatic start
pub const AUTO_START_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScheduledTask {
    StartGame { generation: u64 },
    NextRound { generation: u64 },
    Respawn { combatant_id: CombatantId, generation: u64 },
    AutoRematch { generation: u64 },
    ReloadComplete { combatant_id: CombatantId, token: u64 },
}

/// Min-heap of tasks keyed by due time, FIFO among equal due times
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<(u64, u64, ScheduledTask)>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: u64, task: ScheduledTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((due_ms, seq, task)));
    }

    /// Pop the next task due at or before `now`
    pub fn pop_due(&mut self, now: u64) -> Option<ScheduledTask> {
        let Reverse((due, _, _)) = self.queue.peek()?;
        if *due > now {
            return None;
        }
        self.queue.pop().map(|Reverse((_, _, task))| task)
    }

    #[cfg(test)]
    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse((due, _, _))| *due)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
