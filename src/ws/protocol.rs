//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the matchmaking queue
    JoinQueue {
        #[serde(rename = "userId")]
        user_id: Uuid,
        username: String,
    },

    /// Leave the matchmaking queue
    LeaveQueue {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },

    /// Signal readiness during a match's `waiting` window
    PlayerReady {
        #[serde(rename = "userId")]
        user_id: Uuid,
        #[serde(rename = "matchId")]
        match_id: Uuid,
    },

    /// Submit a tap for validation
    Tap {
        #[serde(rename = "userId")]
        user_id: Uuid,
        #[serde(rename = "matchId")]
        match_id: Uuid,
        timestamp: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Acknowledges a successful queue join
    QueueJoined { position: usize },

    /// Acknowledges a successful queue leave
    QueueLeft {},

    /// Two or more players have been paired into a match
    MatchFound {
        #[serde(rename = "matchId")]
        match_id: Uuid,
        players: Vec<PlayerInfo>,
    },

    /// The match has transitioned to `active`
    MatchStarted {
        #[serde(rename = "matchId")]
        match_id: Uuid,
        duration: u64,
        #[serde(rename = "startTime")]
        start_time: u64,
    },

    /// Broadcast to the match room whenever a tap is validated
    PlayerTapped {
        #[serde(rename = "playerId")]
        player_id: Uuid,
        username: String,
        #[serde(rename = "tapCount")]
        tap_count: u32,
    },

    /// Unicast to the submitter of a validated tap
    TapConfirmed {
        #[serde(rename = "tapCount")]
        tap_count: u32,
    },

    /// Broadcast to the remaining roster when a participant disconnects
    PlayerDisconnected {
        #[serde(rename = "playerId")]
        player_id: Uuid,
    },

    /// The match has transitioned to `finished`
    MatchEnded {
        #[serde(rename = "matchId")]
        match_id: Uuid,
        results: Vec<MatchResultEntry>,
        #[serde(rename = "winnerId")]
        winner_id: Option<Uuid>,
    },

    /// An operation failed; unicast to the offending connection only
    Error { message: String },
}

/// Roster entry sent with `match_found`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub username: String,
}

/// One row of the `match_ended` results table, ordered by descending taps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResultEntry {
    pub id: Uuid,
    pub username: String,
    pub taps: u32,
    #[serde(rename = "isWinner")]
    pub is_winner: bool,
}
