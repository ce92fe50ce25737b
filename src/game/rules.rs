//! Match ruleset and host-supplied overrides

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ws::protocol::{BotDifficulty, MatchMode};

/// Default rounds-to-win (effectively endless deathmatch)
pub const DEFAULT_ROUNDS_TO_WIN: u32 = 999;
/// Default round length in seconds
pub const DEFAULT_ROUND_TIME_SECS: f32 = 180.0;
/// Default bots added in bot modes
pub const DEFAULT_BOT_COUNT: u32 = 4;

const ROUND_TIME_RANGE: (f32, f32) = (10.0, 3600.0);
const MULTIPLIER_RANGE: (f32, f32) = (0.25, 3.0);
/// Bots plus at least one human must fit in a match
pub const MAX_BOT_COUNT: u32 = 11;

/// Effective rules of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub rounds_to_win: u32,
    pub round_time_secs: f32,
    pub auto_rematch: bool,
    pub infinite_ammo: bool,
    pub movement_speed: f32,
    pub jump_level: f32,
    pub match_mode: MatchMode,
    pub bot_difficulty: BotDifficulty,
    pub bot_count: u32,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            rounds_to_win: DEFAULT_ROUNDS_TO_WIN,
            round_time_secs: DEFAULT_ROUND_TIME_SECS,
            auto_rematch: false,
            infinite_ammo: false,
            movement_speed: 1.0,
            jump_level: 1.0,
            match_mode: MatchMode::Pvp,
            bot_difficulty: BotDifficulty::Medium,
            bot_count: 0,
        }
    }
}

/// Partial ruleset sent by the host; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetPatch {
    pub rounds: Option<u32>,
    pub round_time: Option<f32>,
    pub auto_rematch: Option<bool>,
    pub infinite_ammo: Option<bool>,
    pub movement_speed: Option<f32>,
    pub jump_level: Option<f32>,
    pub match_mode: Option<MatchMode>,
    pub bot_difficulty: Option<BotDifficulty>,
    pub bot_count: Option<u32>,
}

impl Ruleset {
    /// Ruleset for a freshly created match.
    ///
    /// Bot modes get the default bot count unless the creator picked one.
    pub fn for_new_match(patch: &RulesetPatch) -> Self {
        let mut base = Self::default();
        if patch.bot_count.is_none() && patch.match_mode.is_some_and(MatchMode::has_bots) {
            base.bot_count = DEFAULT_BOT_COUNT;
        }
        base.merge(patch)
    }

    /// Apply a patch, clamping every numeric field into its legal range.
    /// Non-finite numbers are ignored.
    pub fn merge(&self, patch: &RulesetPatch) -> Self {
        let mut next = self.clone();

        if let Some(rounds) = patch.rounds {
            next.rounds_to_win = rounds.max(1);
        }
        if let Some(secs) = patch.round_time.filter(|v| v.is_finite()) {
            next.round_time_secs = secs.clamp(ROUND_TIME_RANGE.0, ROUND_TIME_RANGE.1);
        }
        if let Some(flag) = patch.auto_rematch {
            next.auto_rematch = flag;
        }
        if let Some(flag) = patch.infinite_ammo {
            next.infinite_ammo = flag;
        }
        if let Some(speed) = patch.movement_speed.filter(|v| v.is_finite()) {
            next.movement_speed = speed.clamp(MULTIPLIER_RANGE.0, MULTIPLIER_RANGE.1);
        }
        if let Some(jump) = patch.jump_level.filter(|v| v.is_finite()) {
            next.jump_level = jump.clamp(MULTIPLIER_RANGE.0, MULTIPLIER_RANGE.1);
        }
        if let Some(mode) = patch.match_mode {
            next.match_mode = mode;
        }
        if let Some(difficulty) = patch.bot_difficulty {
            next.bot_difficulty = difficulty;
        }
        if let Some(count) = patch.bot_count {
            next.bot_count = count.min(MAX_BOT_COUNT);
        }

        if next != *self {
            debug!(?patch, "Ruleset updated");
        }
        next
    }
}
