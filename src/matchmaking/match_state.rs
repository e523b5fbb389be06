//! A single match instance: roster, state machine, and results (spec §3, §4.2)

use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ws::protocol::{MatchResultEntry, ServerMsg};

/// A match's lifecycle phase. `Waiting` covers both the data model's
/// "waiting" and "starting" labels: a freshly paired match has no
/// observable state between pairing and the `Waiting -> Active` transition
/// other than the pending deferred-start timer already carried on
/// `pending_start`, so the two are not modeled as distinct statuses (see
/// DESIGN.md). Transitions strictly follow `Waiting -> Active -> Finished`,
/// collapsible to zero delay on the all-ready early start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Waiting,
    Active,
    Finished,
}

/// Authoritative per-player state within one match
#[derive(Debug)]
pub struct Player {
    pub user_id: Uuid,
    pub display_name: String,
    pub reply: UnboundedSender<ServerMsg>,
    pub validated_taps: u32,
    /// Server time of the last *accepted* tap; `None` before the first, since
    /// a tap legitimately accepted at server-time `0` must still gate the
    /// next one.
    pub last_tap_at_ms: Option<u64>,
    pub ready: bool,
}

impl Player {
    pub fn new(user_id: Uuid, display_name: String, reply: UnboundedSender<ServerMsg>) -> Self {
        Self {
            user_id,
            display_name,
            reply,
            validated_taps: 0,
            last_tap_at_ms: None,
            ready: false,
        }
    }
}

/// One live (or just-finished) match instance.
pub struct Match {
    pub id: Uuid,
    pub status: MatchStatus,
    pub players: HashMap<Uuid, Player>,
    /// Insertion order at creation time; survives individual disconnects so
    /// the end-of-match tie-break can still prefer the earlier joiner.
    pub join_order: Vec<Uuid>,
    pub duration_ms: u64,
    pub start_at_ms: Option<u64>,
    pub end_at_ms: Option<u64>,
    pub winner_id: Option<Uuid>,
    /// Handle to the pending `Starting -> Active` timer, cancelled on an
    /// all-ready early start (spec §5, the one cancellable scheduled task).
    pub pending_start: Option<JoinHandle<()>>,
}

impl Match {
    pub fn new(id: Uuid, players: HashMap<Uuid, Player>, join_order: Vec<Uuid>, duration_ms: u64) -> Self {
        Self {
            id,
            status: MatchStatus::Waiting,
            players,
            join_order,
            duration_ms,
            start_at_ms: None,
            end_at_ms: None,
            winner_id: None,
            pending_start: None,
        }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.players.contains_key(&user_id)
    }

    /// True once every roster member has signalled `player_ready`.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.ready)
    }

    /// Cancel the pending deferred start, if any. Idempotent.
    pub fn cancel_pending_start(&mut self) {
        if let Some(handle) = self.pending_start.take() {
            handle.abort();
        }
    }

    /// Broadcast `msg` to every remaining roster member.
    ///
    /// "Room" broadcast is just iterating the match's connections (spec §9) -
    /// there is no separate transport-level group primitive.
    pub fn broadcast(&self, msg: ServerMsg) {
        for player in self.players.values() {
            let _ = player.reply.send(msg.clone());
        }
    }

    /// Determine the winner and build the descending-taps results table.
    /// Ties are broken by `join_order` (earlier joiner wins / sorts first).
    pub fn build_results(&self) -> (Option<Uuid>, Vec<MatchResultEntry>) {
        let rank_of = |id: &Uuid| self.join_order.iter().position(|x| x == id).unwrap_or(usize::MAX);

        let mut ordered: Vec<&Player> = self.players.values().collect();
        ordered.sort_by(|a, b| {
            b.validated_taps
                .cmp(&a.validated_taps)
                .then_with(|| rank_of(&a.user_id).cmp(&rank_of(&b.user_id)))
        });

        let winner_id = ordered
            .first()
            .filter(|p| p.validated_taps > 0)
            .map(|p| p.user_id);

        let results = ordered
            .iter()
            .map(|p| MatchResultEntry {
                id: p.user_id,
                username: p.display_name.clone(),
                taps: p.validated_taps,
                is_winner: Some(p.user_id) == winner_id,
            })
            .collect();

        (winner_id, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn player(id: Uuid, name: &str, taps: u32) -> Player {
        let (tx, _rx) = unbounded_channel();
        let mut p = Player::new(id, name.to_string(), tx);
        p.validated_taps = taps;
        p
    }

    #[test]
    fn winner_is_strictly_greatest_validated_taps() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(a, player(a, "A", 3));
        players.insert(b, player(b, "B", 2));

        let m = Match::new(Uuid::new_v4(), players, vec![a, b], 30_000);
        let (winner, results) = m.build_results();

        assert_eq!(winner, Some(a));
        assert_eq!(results[0].id, a);
        assert_eq!(results[1].id, b);
        assert!(results[0].is_winner);
        assert!(!results[1].is_winner);
    }

    #[test]
    fn tie_break_prefers_earlier_joiner() {
        // S6: A and B both have 7 taps, A joined first -> A wins, lists first
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(a, player(a, "A", 7));
        players.insert(b, player(b, "B", 7));

        let m = Match::new(Uuid::new_v4(), players, vec![a, b], 30_000);
        let (winner, results) = m.build_results();

        assert_eq!(winner, Some(a));
        assert_eq!(results[0].id, a);
        assert_eq!(results[1].id, b);
    }

    #[test]
    fn zero_taps_across_all_players_has_no_winner() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(a, player(a, "A", 0));
        players.insert(b, player(b, "B", 0));

        let m = Match::new(Uuid::new_v4(), players, vec![a, b], 30_000);
        let (winner, _) = m.build_results();

        assert_eq!(winner, None);
    }

    #[test]
    fn all_ready_requires_every_roster_member() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(a, player(a, "A", 0));
        players.insert(b, player(b, "B", 0));
        let mut m = Match::new(Uuid::new_v4(), players, vec![a, b], 30_000);

        assert!(!m.all_ready());
        m.players.get_mut(&a).unwrap().ready = true;
        assert!(!m.all_ready());
        m.players.get_mut(&b).unwrap().ready = true;
        assert!(m.all_ready());
    }
}
