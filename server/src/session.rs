//! Channel-contention state machine for one two-player game
//!
//! A session models a shared medium between exactly two transmitters. Each
//! successful transmission stays "in the air" for one propagation delay; a
//! transmission that starts while the opponent has anything in the air is a
//! collision and is lost. Only arrival order decides the outcome, so two
//! sends landing in the same instant are resolved by whichever is applied
//! first.
//!
//! The session is a pure state machine: it never sleeps or spawns. Every
//! operation returns the notifications it produced and the caller delivers
//! them and schedules any follow-up timers.

use crate::leaderboard::Leaderboard;
use crate::matchmaking::WaitingEntry;
use crate::ConnectionId;
use log::debug;
use shared::{LeaderboardEntry, Packet};
use std::time::Duration;
use tokio::time::Instant;

/// Session identifier, unique for the lifetime of the process
pub type SessionId = u64;

/// A packet addressed to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub packet: Packet,
}

impl Outbound {
    pub fn new(to: ConnectionId, packet: Packet) -> Self {
        Self { to, packet }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Finalized,
}

/// One side of the channel
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ConnectionId,
    pub name: String,
    pub packets_sent: u32,
    pub packets_successful: u32,
    /// Successful transmissions whose propagation delay has not elapsed yet
    pub packets_in_air: u32,
}

impl Participant {
    fn new(entry: WaitingEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            packets_sent: 0,
            packets_successful: 0,
            packets_in_air: 0,
        }
    }

    fn counts(&self) -> (u32, u32) {
        (self.packets_successful, self.packets_sent)
    }
}

/// What a single `transmit` call produced
#[derive(Debug, Clone)]
pub struct TransmitReport {
    pub notifications: Vec<Outbound>,
    /// False when the transmission went on the wire and needs a propagation timer
    pub collision: bool,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    participants: [Participant; 2],
    ends_at: Instant,
    state: SessionState,
}

impl Session {
    pub fn new(
        id: SessionId,
        first: WaitingEntry,
        second: WaitingEntry,
        started_at: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            id,
            participants: [Participant::new(first), Participant::new(second)],
            ends_at: started_at + duration,
            state: SessionState::Active,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }

    pub fn participant(&self, id: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn opponent_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.index_of(id).map(|i| self.participants[1 - i].id)
    }

    fn index_of(&self, id: ConnectionId) -> Option<usize> {
        self.participants.iter().position(|p| p.id == id)
    }

    pub fn is_accepting(&self, now: Instant) -> bool {
        self.state == SessionState::Active && now < self.ends_at
    }

    /// Applies one transmission attempt from `sender`
    ///
    /// Returns `None` without touching any counter when the session no longer
    /// accepts transmissions or `sender` is not a participant.
    pub fn transmit(&mut self, sender: ConnectionId, now: Instant) -> Option<TransmitReport> {
        if !self.is_accepting(now) {
            return None;
        }
        let s = self.index_of(sender)?;
        let o = 1 - s;

        self.participants[s].packets_sent += 1;
        let collision = self.participants[o].packets_in_air > 0;

        let mut notifications = Vec::with_capacity(4);
        if collision {
            let (your_packets, total_sent) = self.participants[s].counts();
            notifications.push(Outbound::new(
                sender,
                Packet::PacketResult {
                    success: false,
                    your_packets,
                    total_sent,
                    collision: Some(true),
                },
            ));

            let opponent = &self.participants[o];
            let (your_packets, total_sent) = opponent.counts();
            notifications.push(Outbound::new(
                opponent.id,
                Packet::Collision {
                    your_packets,
                    total_sent,
                },
            ));
        } else {
            let player = &mut self.participants[s];
            player.packets_successful += 1;
            player.packets_in_air += 1;

            let (your_packets, total_sent) = player.counts();
            notifications.push(Outbound::new(
                sender,
                Packet::PacketResult {
                    success: true,
                    your_packets,
                    total_sent,
                    collision: None,
                },
            ));
        }

        debug!(
            "Session {}: client {} transmit -> {}",
            self.id,
            sender,
            if collision { "collision" } else { "on the wire" }
        );

        let score = self.score();
        for p in &self.participants {
            notifications.push(Outbound::new(p.id, Packet::ScoreUpdate { score }));
        }

        Some(TransmitReport {
            notifications,
            collision,
        })
    }

    /// Takes one of `sender`'s transmissions off the wire
    ///
    /// Tells the opponent whether the channel is still busy, which happens
    /// when `sender` had several transmissions overlapping.
    pub fn propagation_elapsed(&mut self, sender: ConnectionId) -> Option<Outbound> {
        if self.state != SessionState::Active {
            return None;
        }
        let s = self.index_of(sender)?;
        let player = &mut self.participants[s];

        debug_assert!(
            player.packets_in_air > 0,
            "propagation timer fired with no packet in the air"
        );
        player.packets_in_air = player.packets_in_air.saturating_sub(1);
        let busy = player.packets_in_air > 0;

        let opponent = self.participants[1 - s].id;
        Some(Outbound::new(opponent, Packet::ChannelBusy { busy }))
    }

    /// Whole seconds left until the session ends, floored at zero
    pub fn time_left(&self, now: Instant) -> u64 {
        self.ends_at.saturating_duration_since(now).as_secs()
    }

    /// Builds the `TimeUpdate` for both participants
    pub fn countdown(&self, now: Instant) -> Vec<Outbound> {
        let time_left = self.time_left(now);
        self.participants
            .iter()
            .map(|p| Outbound::new(p.id, Packet::TimeUpdate { time_left }))
            .collect()
    }

    /// Current score of the team
    pub fn score(&self) -> u32 {
        harmonic_score(
            self.participants[0].packets_successful,
            self.participants[1].packets_successful,
        )
    }

    /// Records the result on `leaderboard` and produces the `GameOver` packets
    ///
    /// Only the first call has any effect; later calls return nothing.
    pub fn finalize(&mut self, leaderboard: &Leaderboard, timestamp: u64) -> Vec<Outbound> {
        if self.state == SessionState::Finalized {
            return Vec::new();
        }
        self.state = SessionState::Finalized;

        let final_score = self.score();
        let [first, second] = &self.participants;
        leaderboard.record(LeaderboardEntry::new(
            &first.name,
            &second.name,
            final_score,
            first.packets_successful,
            second.packets_successful,
            timestamp,
        ));
        let snapshot = leaderboard.snapshot();

        self.participants
            .iter()
            .map(|p| {
                Outbound::new(
                    p.id,
                    Packet::GameOver {
                        final_score,
                        your_packets: p.packets_successful,
                        total_sent: p.packets_sent,
                        leaderboard: snapshot.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Harmonic mean of two success counts
pub fn harmonic_mean(a: u32, b: u32) -> f64 {
    if a == 0 || b == 0 {
        return 0.0;
    }
    let (a, b) = (a as f64, b as f64);
    2.0 * a * b / (a + b)
}

/// Team score: the harmonic mean of both success counts rounded half up,
/// zero while either side has not delivered anything
pub fn harmonic_score(a: u32, b: u32) -> u32 {
    harmonic_mean(a, b).round() as u32
}
