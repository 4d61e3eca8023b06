//! Tunable constants of a game session
//!
//! The defaults reproduce the classic setup: one-minute games, a two second
//! propagation delay, a countdown every second and a top-10 leaderboard.
//! Changing them alters pacing only, never the contention rules.

use shared::{COUNTDOWN_TICK_MS, GAME_DURATION_SECS, LEADERBOARD_SIZE, PROPAGATION_DELAY_MS};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Length of a session from pairing to finalize
    pub game_duration: Duration,
    /// Time a successful transmission occupies the channel
    pub propagation_delay: Duration,
    /// Interval between `TimeUpdate` notifications
    pub tick_interval: Duration,
    /// Number of results kept on the leaderboard
    pub leaderboard_size: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_duration: Duration::from_secs(GAME_DURATION_SECS),
            propagation_delay: Duration::from_millis(PROPAGATION_DELAY_MS),
            tick_interval: Duration::from_millis(COUNTDOWN_TICK_MS),
            leaderboard_size: LEADERBOARD_SIZE,
        }
    }
}

impl GameConfig {
    /// Rejects configurations that would make a session meaningless
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.game_duration.is_zero() {
            return Err("game duration must be greater than zero".into());
        }
        if self.propagation_delay.is_zero() {
            return Err("propagation delay must be greater than zero".into());
        }
        if self.tick_interval.is_zero() {
            return Err("tick interval must be greater than zero".into());
        }
        if self.tick_interval > self.game_duration {
            return Err("tick interval must not exceed the game duration".into());
        }
        if self.leaderboard_size == 0 {
            return Err("leaderboard size must be at least 1".into());
        }
        Ok(())
    }

    /// Duration announced to clients in `GameStart`, in whole seconds
    pub fn duration_secs(&self) -> u64 {
        self.game_duration.as_secs()
    }
}
