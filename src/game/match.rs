//! Match task: fixed-rate tick loop around a [`MatchEngine`]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{unix_millis, TICK_DURATION_MICROS};

use super::engine::MatchEngine;
use super::{Envelope, MatchCommand, MatchId};

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: MatchId,
    pub join_code: String,
    pub command_tx: mpsc::Sender<MatchCommand>,
    pub events_tx: broadcast::Sender<Envelope>,
    pub human_count: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn human_count(&self) -> usize {
        self.human_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events_tx.subscribe()
    }

    /// The match loop has exited
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

/// The authoritative game match
pub struct GameMatch {
    engine: MatchEngine,
    command_rx: mpsc::Receiver<MatchCommand>,
    events_tx: broadcast::Sender<Envelope>,
    human_count: Arc<AtomicUsize>,
}

impl GameMatch {
    /// Wrap an engine. Events the engine already produced (e.g. for the host)
    /// are delivered once the loop starts, so subscribe before spawning.
    pub fn new(engine: MatchEngine) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let human_count = Arc::new(AtomicUsize::new(engine.human_count()));

        let handle = MatchHandle {
            id: engine.id(),
            join_code: engine.join_code().to_string(),
            command_tx,
            events_tx: events_tx.clone(),
            human_count: human_count.clone(),
        };

        let game_match = Self {
            engine,
            command_rx,
            events_tx,
            human_count,
        };

        (game_match, handle)
    }

    /// Run until the last human leaves or every handle is dropped
    pub async fn run(mut self) {
        let match_id = self.engine.id();
        info!(match_id = %match_id, join_code = %self.engine.join_code(), "Match loop started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.flush();

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = unix_millis();
                    // Timers fire regardless of status, the tick itself is gated
                    self.engine.run_due(now);
                    self.engine.tick(now);
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        debug!(match_id = %match_id, "All match handles dropped");
                        break;
                    }
                },
            }

            self.flush();

            if self.engine.is_closed() {
                break;
            }
        }

        info!(match_id = %match_id, "Match loop stopped");
    }

    fn apply(&mut self, command: MatchCommand) {
        let now = unix_millis();
        match command {
            MatchCommand::Join {
                combatant_id,
                nickname,
                class_id,
                reply,
            } => {
                let result = self
                    .engine
                    .add_human(combatant_id, nickname, class_id, now)
                    .map(|()| self.engine.rules().clone());
                let joined = result.is_ok();
                // Joiner gave up waiting: undo the seat
                if reply.send(result).is_err() && joined {
                    self.engine.remove(combatant_id, now);
                }
            }
            MatchCommand::Action {
                combatant_id,
                action,
            } => self.engine.handle_action(combatant_id, action, now),
            MatchCommand::Leave { combatant_id } => self.engine.remove(combatant_id, now),
        }
    }

    /// Publish queued events and the current head count
    fn flush(&mut self) {
        self.human_count
            .store(self.engine.human_count(), Ordering::Relaxed);
        for envelope in self.engine.drain_events() {
            // No receivers is fine, nobody is listening yet
            let _ = self.events_tx.send(envelope);
        }
    }
}
