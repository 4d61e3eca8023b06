use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const GAME_DURATION_SECS: u64 = 60;
pub const PROPAGATION_DELAY_MS: u64 = 2000;
pub const COUNTDOWN_TICK_MS: u64 = 1000;
pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Heartbeat,
    Join {
        name: String,
    },
    Transmit,
    GetLeaderboard,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Disconnected {
        reason: String,
    },
    Waiting {
        players_in_queue: u32,
    },
    GameStart {
        opponent: String,
        duration: u64,
    },
    PacketResult {
        success: bool,
        your_packets: u32,
        total_sent: u32,
        collision: Option<bool>,
    },
    ChannelBusy {
        busy: bool,
    },
    Collision {
        your_packets: u32,
        total_sent: u32,
    },
    ScoreUpdate {
        score: u32,
    },
    TimeUpdate {
        time_left: u64,
    },
    GameOver {
        final_score: u32,
        your_packets: u32,
        total_sent: u32,
        leaderboard: Vec<LeaderboardEntry>,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    OpponentDisconnected,
}

impl Packet {
    /// True for packets a client is allowed to send to the server
    pub fn is_client_packet(&self) -> bool {
        matches!(
            self,
            Packet::Connect { .. }
                | Packet::Heartbeat
                | Packet::Join { .. }
                | Packet::Transmit
                | Packet::GetLeaderboard
                | Packet::Disconnect
        )
    }
}

/// Result of one finished game as kept on the leaderboard
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub team: String,
    pub score: u32,
    pub player1_packets: u32,
    pub player2_packets: u32,
    pub timestamp: u64,
}

impl LeaderboardEntry {
    pub fn new(
        first_name: &str,
        second_name: &str,
        score: u32,
        player1_packets: u32,
        player2_packets: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            team: team_label(first_name, second_name),
            score,
            player1_packets,
            player2_packets,
            timestamp,
        }
    }
}

pub fn team_label(first_name: &str, second_name: &str) -> String {
    format!("{} & {}", first_name, second_name)
}
