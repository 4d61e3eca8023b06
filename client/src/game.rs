//! Client-side view of a game and the carrier-sense transmit policy
//!
//! The bot mirrors what the server tells it: its own counters, the team score,
//! the remaining time and whether the opponent's last packet is still on the
//! wire. From that it decides when to transmit:
//! - never while the channel is reported busy
//! - after a collision, stay quiet for a random number of send slots

use log::{debug, info};
use rand::Rng;
use shared::{LeaderboardEntry, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone)]
pub struct ClientGameState {
    pub client_id: Option<u32>,
    pub phase: Phase,
    pub opponent: Option<String>,
    pub channel_busy: bool,
    pub backoff_remaining: u32,
    pub max_backoff: u32,
    pub your_packets: u32,
    pub total_sent: u32,
    pub collisions: u32,
    pub score: u32,
    pub time_left: u64,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl ClientGameState {
    pub fn new(max_backoff: u32) -> Self {
        Self {
            client_id: None,
            phase: Phase::Connecting,
            opponent: None,
            channel_busy: false,
            backoff_remaining: 0,
            max_backoff: max_backoff.max(1),
            your_packets: 0,
            total_sent: 0,
            collisions: 0,
            score: 0,
            time_left: 0,
            leaderboard: Vec::new(),
        }
    }

    /// Updates the view from one server packet
    pub fn apply_packet<R: Rng>(&mut self, packet: &Packet, rng: &mut R) {
        match packet {
            Packet::Connected { client_id } => {
                self.client_id = Some(*client_id);
            }
            Packet::Waiting { players_in_queue } => {
                info!("Waiting for an opponent ({} in queue)", players_in_queue);
                self.phase = Phase::Waiting;
            }
            Packet::GameStart { opponent, duration } => {
                info!("Game started against {} for {}s", opponent, duration);
                self.phase = Phase::Playing;
                self.opponent = Some(opponent.clone());
                self.time_left = *duration;
                self.channel_busy = false;
                self.backoff_remaining = 0;
                self.your_packets = 0;
                self.total_sent = 0;
                self.collisions = 0;
                self.score = 0;
            }
            Packet::PacketResult {
                success,
                your_packets,
                total_sent,
                ..
            } => {
                self.your_packets = *your_packets;
                self.total_sent = *total_sent;
                if !success {
                    self.register_collision(rng);
                }
            }
            Packet::Collision {
                your_packets,
                total_sent,
            } => {
                self.your_packets = *your_packets;
                self.total_sent = *total_sent;
                self.register_collision(rng);
            }
            Packet::ChannelBusy { busy } => {
                self.channel_busy = *busy;
            }
            Packet::ScoreUpdate { score } => {
                self.score = *score;
            }
            Packet::TimeUpdate { time_left } => {
                self.time_left = *time_left;
            }
            Packet::GameOver {
                final_score,
                your_packets,
                total_sent,
                leaderboard,
            } => {
                info!(
                    "Game over: score {}, delivered {}/{}",
                    final_score, your_packets, total_sent
                );
                self.phase = Phase::Finished;
                self.score = *final_score;
                self.your_packets = *your_packets;
                self.total_sent = *total_sent;
                self.leaderboard = leaderboard.clone();
            }
            Packet::Leaderboard { entries } => {
                self.leaderboard = entries.clone();
            }
            Packet::OpponentDisconnected | Packet::Disconnected { .. } => {
                self.phase = Phase::Finished;
            }
            other => debug!("Ignoring packet {:?}", other),
        }
    }

    fn register_collision<R: Rng>(&mut self, rng: &mut R) {
        self.collisions += 1;
        self.backoff_remaining = rng.gen_range(1..=self.max_backoff);
        debug!("Collision, backing off {} slots", self.backoff_remaining);
    }

    /// Consumes one send slot and says whether to transmit in it
    pub fn should_transmit(&mut self) -> bool {
        if self.phase != Phase::Playing || self.channel_busy {
            return false;
        }
        if self.backoff_remaining > 0 {
            self.backoff_remaining -= 1;
            return false;
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn playing_state() -> (ClientGameState, StdRng) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = ClientGameState::new(3);
        state.apply_packet(
            &Packet::GameStart {
                opponent: "Bob".to_string(),
                duration: 60,
            },
            &mut rng,
        );
        (state, rng)
    }

    #[test]
    fn test_does_not_transmit_before_game() {
        let mut state = ClientGameState::new(3);
        assert!(!state.should_transmit());

        let mut rng = StdRng::seed_from_u64(1);
        state.apply_packet(&Packet::Waiting { players_in_queue: 1 }, &mut rng);
        assert_eq!(state.phase, Phase::Waiting);
        assert!(!state.should_transmit());
    }

    #[test]
    fn test_transmits_when_idle() {
        let (mut state, _) = playing_state();
        assert_eq!(state.opponent.as_deref(), Some("Bob"));
        assert_eq!(state.time_left, 60);
        assert!(state.should_transmit());
    }

    #[test]
    fn test_holds_while_channel_busy() {
        let (mut state, mut rng) = playing_state();
        state.apply_packet(&Packet::ChannelBusy { busy: true }, &mut rng);
        assert!(!state.should_transmit());

        state.apply_packet(&Packet::ChannelBusy { busy: false }, &mut rng);
        assert!(state.should_transmit());
    }

    #[test]
    fn test_backs_off_after_collision() {
        let (mut state, mut rng) = playing_state();
        state.apply_packet(
            &Packet::PacketResult {
                success: false,
                your_packets: 0,
                total_sent: 1,
                collision: Some(true),
            },
            &mut rng,
        );

        let backoff = state.backoff_remaining;
        assert!((1..=3).contains(&backoff));
        assert_eq!(state.collisions, 1);
        for _ in 0..backoff {
            assert!(!state.should_transmit());
        }
        assert!(state.should_transmit());
    }

    #[test]
    fn test_opponent_collision_counts() {
        let (mut state, mut rng) = playing_state();
        state.apply_packet(
            &Packet::Collision {
                your_packets: 4,
                total_sent: 5,
            },
            &mut rng,
        );
        assert_eq!(state.your_packets, 4);
        assert_eq!(state.total_sent, 5);
        assert!(state.backoff_remaining >= 1);
    }

    #[test]
    fn test_game_over_finishes() {
        let (mut state, mut rng) = playing_state();
        let leaderboard = vec![LeaderboardEntry::new("Alice", "Bob", 3, 3, 4, 0)];
        state.apply_packet(
            &Packet::GameOver {
                final_score: 3,
                your_packets: 3,
                total_sent: 6,
                leaderboard: leaderboard.clone(),
            },
            &mut rng,
        );

        assert!(state.is_finished());
        assert_eq!(state.score, 3);
        assert_eq!(state.leaderboard, leaderboard);
        assert!(!state.should_transmit());
    }

    #[test]
    fn test_opponent_disconnect_finishes() {
        let (mut state, mut rng) = playing_state();
        state.apply_packet(&Packet::OpponentDisconnected, &mut rng);
        assert!(state.is_finished());
    }
}
