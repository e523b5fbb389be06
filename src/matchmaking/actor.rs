//! The Matchmaker: the single actor task that owns all matchmaking state
//! (spec §4, §5).
//!
//! Every operation in spec §4.1 is a method on `Matchmaker` invoked from the
//! `run` loop as commands arrive over one `mpsc` channel. Because the loop
//! processes one command at a time, there is never a data race between two
//! operations, and no operation can observe a partially-applied effect of
//! another - the generalization of the original per-match actor task to a
//! single matchmaker-wide actor, since invariants like "never queued twice"
//! and "always in at most one match" span match boundaries.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, MatchConfig};
use crate::matchmaking::error::MatchmakerError;
use crate::matchmaking::match_state::{Match, MatchStatus, Player};
use crate::matchmaking::queue::{Queue, QueuedPlayer};
use crate::matchmaking::validator::{validate, TapVerdict};
use crate::util::time::unix_millis;
use crate::ws::protocol::{PlayerInfo, ServerMsg};

/// A connection's personal outbound channel; every inbound command that can
/// fail carries the reply sender for the connection that issued it, so the
/// actor can answer with `error` even for connections it has no other record
/// of (e.g. `leave_queue` before ever joining).
pub type ReplyTx = UnboundedSender<ServerMsg>;

/// Commands the Event Gateway (the WebSocket handler) dispatches into the
/// Matchmaker. One variant per client-facing operation in spec §4.1, plus the
/// internal timer and disconnect events and a health query.
#[derive(Debug)]
pub enum Command {
    JoinQueue {
        player_id: Uuid,
        display_name: String,
        connection_id: Uuid,
        reply: ReplyTx,
    },
    LeaveQueue {
        player_id: Uuid,
        reply: ReplyTx,
    },
    MarkReady {
        player_id: Uuid,
        match_id: Uuid,
        reply: ReplyTx,
    },
    SubmitTap {
        player_id: Uuid,
        match_id: Uuid,
        client_timestamp_ms: u64,
        reply: ReplyTx,
    },
    /// A connection dropped; `connection_id` is opaque to everything but the
    /// actor's own `connection_to_player` index.
    Disconnect {
        connection_id: Uuid,
    },
    Timer(TimerEvent),
    Health {
        reply: oneshot::Sender<HealthSnapshot>,
    },
}

/// Internal events raised by the actor's own scheduled timers.
#[derive(Debug, Clone, Copy)]
pub enum TimerEvent {
    StartMatch(Uuid),
    EndMatch(Uuid),
    CleanupMatch(Uuid),
}

/// Point-in-time counters for the `/health` HTTP surface (spec §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSnapshot {
    pub queue_size: usize,
    pub active_matches: usize,
    pub connected_players: usize,
}

/// A cloneable front door to the Matchmaker actor. Cheap to clone (wraps one
/// `mpsc::Sender`); every connection task holds its own copy.
#[derive(Clone)]
pub struct MatchmakerHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl MatchmakerHandle {
    pub async fn send(&self, cmd: Command) {
        // The channel only closes if the actor task has panicked; dropping
        // the command on a closed channel is the correct degraded behavior.
        let _ = self.cmd_tx.send(cmd).await;
    }

    pub async fn health(&self) -> HealthSnapshot {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Health { reply: tx }).await;
        rx.await.unwrap_or_default()
    }
}

/// Spawn the Matchmaker actor task and return a handle to it.
pub fn spawn(config: &Config) -> MatchmakerHandle {
    spawn_with_config(config.matching)
}

/// Spawn with just the matchmaking constants, independent of the rest of
/// `Config` - the entry point used by tests.
pub fn spawn_with_config(matching: MatchConfig) -> MatchmakerHandle {
    let (tx, rx) = mpsc::channel(1024);
    let matchmaker = Matchmaker {
        config: matching,
        queue: Queue::new(),
        matches: HashMap::new(),
        player_to_match: HashMap::new(),
        connection_to_player: HashMap::new(),
        player_to_connection: HashMap::new(),
        self_tx: tx.clone(),
    };
    tokio::spawn(matchmaker.run(rx));
    MatchmakerHandle { cmd_tx: tx }
}

/// Owner of every mutable matchmaking structure: the queue, every in-flight
/// match, and the indices connecting a player id to a connection id and to
/// the match they currently occupy.
struct Matchmaker {
    config: MatchConfig,
    queue: Queue,
    matches: HashMap<Uuid, Match>,
    player_to_match: HashMap<Uuid, Uuid>,
    connection_to_player: HashMap<Uuid, Uuid>,
    player_to_connection: HashMap<Uuid, Uuid>,
    self_tx: mpsc::Sender<Command>,
}

impl Matchmaker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::JoinQueue {
                player_id,
                display_name,
                connection_id,
                reply,
            } => self.join_queue(player_id, display_name, connection_id, reply),

            Command::LeaveQueue { player_id, reply } => self.leave_queue(player_id, reply),

            Command::MarkReady {
                player_id,
                match_id,
                reply,
            } => self.mark_ready(player_id, match_id, reply),

            Command::SubmitTap {
                player_id,
                match_id,
                client_timestamp_ms,
                reply,
            } => self.submit_tap(player_id, match_id, client_timestamp_ms, reply),

            Command::Disconnect { connection_id } => self.on_disconnect(connection_id),

            Command::Timer(TimerEvent::StartMatch(match_id)) => self.start_match(match_id),
            Command::Timer(TimerEvent::EndMatch(match_id)) => self.end_match(match_id),
            Command::Timer(TimerEvent::CleanupMatch(match_id)) => self.cleanup_match(match_id),

            Command::Health { reply } => {
                let _ = reply.send(self.health_snapshot());
            }
        }
    }

    // ---- operations (spec §4.1) ----

    fn join_queue(
        &mut self,
        player_id: Uuid,
        display_name: String,
        connection_id: Uuid,
        reply: ReplyTx,
    ) {
        if self.player_to_match.contains_key(&player_id) {
            let _ = reply.send(error_msg(MatchmakerError::AlreadyInMatch));
            return;
        }
        if self.queue.contains(player_id) {
            let _ = reply.send(error_msg(MatchmakerError::AlreadyQueued));
            return;
        }

        self.connection_to_player.insert(connection_id, player_id);
        self.player_to_connection.insert(player_id, connection_id);

        self.queue.enqueue(QueuedPlayer::new(
            player_id,
            display_name,
            connection_id,
            reply.clone(),
        ));

        let position = self.queue.position(player_id).unwrap_or(self.queue.len());
        info!(%player_id, position, "player joined queue");
        let _ = reply.send(ServerMsg::QueueJoined { position });

        if self.queue.len() >= self.config.match_size {
            self.create_match();
        }
    }

    fn leave_queue(&mut self, player_id: Uuid, reply: ReplyTx) {
        match self.queue.dequeue(player_id) {
            Some(_) => {
                if let Some(connection_id) = self.player_to_connection.remove(&player_id) {
                    self.connection_to_player.remove(&connection_id);
                }
                info!(%player_id, "player left queue");
                let _ = reply.send(ServerMsg::QueueLeft {});
            }
            None => {
                let _ = reply.send(error_msg(MatchmakerError::NotQueued));
            }
        }
    }

    fn mark_ready(&mut self, player_id: Uuid, match_id: Uuid, reply: ReplyTx) {
        let Some(m) = self.matches.get_mut(&match_id) else {
            let _ = reply.send(error_msg(MatchmakerError::MatchNotFound));
            return;
        };
        if !m.contains(player_id) {
            let _ = reply.send(error_msg(MatchmakerError::NotInMatch));
            return;
        }

        if let Some(player) = m.players.get_mut(&player_id) {
            player.ready = true;
        }

        if m.status == MatchStatus::Waiting && m.all_ready() {
            self.start_match(match_id);
        }
    }

    fn submit_tap(
        &mut self,
        player_id: Uuid,
        match_id: Uuid,
        client_timestamp_ms: u64,
        reply: ReplyTx,
    ) {
        let Some(m) = self.matches.get_mut(&match_id) else {
            let _ = reply.send(error_msg(MatchmakerError::MatchNotFound));
            return;
        };
        if !m.contains(player_id) {
            let _ = reply.send(error_msg(MatchmakerError::NotInMatch));
            return;
        }
        if m.status != MatchStatus::Active {
            let _ = reply.send(error_msg(MatchmakerError::MatchNotActive));
            return;
        }

        let now = unix_millis();
        let last_tap_at_ms = m.players[&player_id].last_tap_at_ms;

        match validate(last_tap_at_ms, now, client_timestamp_ms, &self.config) {
            TapVerdict::Accept => {
                let (tap_count, display_name) = {
                    let player = m.players.get_mut(&player_id).unwrap();
                    player.validated_taps += 1;
                    player.last_tap_at_ms = Some(now);
                    (player.validated_taps, player.display_name.clone())
                };
                m.broadcast(ServerMsg::PlayerTapped {
                    player_id,
                    username: display_name,
                    tap_count,
                });
                let _ = reply.send(ServerMsg::TapConfirmed { tap_count });
            }
            TapVerdict::Reject(reason) => {
                warn!(%player_id, %match_id, %reason, "tap rejected");
                let _ = reply.send(error_msg(MatchmakerError::InvalidTap(reason)));
            }
        }
    }

    fn on_disconnect(&mut self, connection_id: Uuid) {
        // L3: an unrecognized connection is a no-op.
        let Some(player_id) = self.connection_to_player.remove(&connection_id) else {
            return;
        };
        self.player_to_connection.remove(&player_id);
        self.queue.dequeue(player_id);

        if let Some(match_id) = self.player_to_match.remove(&player_id) {
            if let Some(m) = self.matches.get_mut(&match_id) {
                m.players.remove(&player_id);
                info!(%player_id, %match_id, "player disconnected from match");
                m.broadcast(ServerMsg::PlayerDisconnected { player_id });

                if m.players.is_empty() {
                    info!(%match_id, "match roster empty, ending match");
                    self.end_match(match_id);
                }
            }
        }
    }

    // ---- internal transitions ----

    fn create_match(&mut self) {
        while self.queue.len() >= self.config.match_size {
            let drawn = self.queue.drain_front(self.config.match_size);
            let match_id = Uuid::new_v4();
            let join_order: Vec<Uuid> = drawn.iter().map(|p| p.user_id).collect();

            let mut players = HashMap::new();
            for qp in &drawn {
                players.insert(
                    qp.user_id,
                    Player::new(qp.user_id, qp.display_name.clone(), qp.reply.clone()),
                );
            }

            let roster: Vec<PlayerInfo> = drawn
                .iter()
                .map(|p| PlayerInfo {
                    id: p.user_id,
                    username: p.display_name.clone(),
                })
                .collect();

            let mut m = Match::new(match_id, players, join_order, self.config.match_duration_ms);

            for qp in &drawn {
                self.player_to_match.insert(qp.user_id, match_id);
                let _ = qp.reply.send(ServerMsg::MatchFound {
                    match_id,
                    players: roster.clone(),
                });
            }

            m.pending_start = Some(self.schedule_timer(
                TimerEvent::StartMatch(match_id),
                self.config.start_delay_ms,
            ));

            info!(%match_id, players = m.join_order.len(), "match created");
            self.matches.insert(match_id, m);
        }
    }

    /// Transition `Waiting -> Active`. Idempotent: a no-op if the match is
    /// gone or already past `Waiting`, so the deferred timer and an
    /// all-ready early start can race harmlessly (spec §9, Open Question).
    fn start_match(&mut self, match_id: Uuid) {
        let Some(m) = self.matches.get_mut(&match_id) else {
            return;
        };
        if m.status != MatchStatus::Waiting {
            return;
        }

        m.cancel_pending_start();
        m.status = MatchStatus::Active;
        let now = unix_millis();
        m.start_at_ms = Some(now);

        m.broadcast(ServerMsg::MatchStarted {
            match_id,
            duration: m.duration_ms,
            start_time: now,
        });
        info!(%match_id, "match starting -> active");

        self.schedule_timer(TimerEvent::EndMatch(match_id), m.duration_ms);
    }

    /// Transition to `Finished`, compute the winner and broadcast
    /// `match_ended`. Idempotent; reachable both from the duration timer and
    /// from a roster-emptying disconnect.
    fn end_match(&mut self, match_id: Uuid) {
        let Some(m) = self.matches.get_mut(&match_id) else {
            return;
        };
        if m.status == MatchStatus::Finished {
            return;
        }

        m.cancel_pending_start();
        m.status = MatchStatus::Finished;
        m.end_at_ms = Some(unix_millis());

        let (winner_id, results) = m.build_results();
        m.winner_id = winner_id;
        m.broadcast(ServerMsg::MatchEnded {
            match_id,
            results,
            winner_id,
        });
        info!(%match_id, ?winner_id, "match active -> finished");

        for player_id in m.players.keys() {
            self.player_to_match.remove(player_id);
        }

        self.schedule_timer(TimerEvent::CleanupMatch(match_id), self.config.cleanup_delay_ms);
    }

    /// Drop a finished match entirely. Idempotent - a repeated or
    /// already-evicted `match_id` is a silent no-op.
    fn cleanup_match(&mut self, match_id: Uuid) {
        if let Some(m) = self.matches.remove(&match_id) {
            info!(%match_id, "match cleaned up");
            for player_id in m.players.keys() {
                self.player_to_match.remove(player_id);
            }
        }
    }

    fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            queue_size: self.queue.len(),
            active_matches: self.matches.len(),
            connected_players: self.connection_to_player.len(),
        }
    }

    fn schedule_timer(&self, event: TimerEvent, delay_ms: u64) -> JoinHandle<()> {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(Command::Timer(event)).await;
        })
    }
}

fn error_msg(err: MatchmakerError) -> ServerMsg {
    ServerMsg::Error {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::{advance, Duration as TokioDuration};

    fn config() -> MatchConfig {
        MatchConfig {
            match_size: 2,
            match_duration_ms: 30_000,
            start_delay_ms: 2_000,
            cleanup_delay_ms: 5_000,
            max_taps_per_second: 10,
            tap_clock_skew_window_ms: 100,
        }
    }

    async fn join(
        mm: &MatchmakerHandle,
        player_id: Uuid,
        name: &str,
    ) -> (Uuid, tokio::sync::mpsc::UnboundedReceiver<ServerMsg>) {
        let (tx, rx) = unbounded_channel();
        let connection_id = Uuid::new_v4();
        mm.send(Command::JoinQueue {
            player_id,
            display_name: name.to_string(),
            connection_id,
            reply: tx,
        })
        .await;
        (connection_id, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn s1_two_players_are_paired_started_and_ended() {
        let mm = spawn_with_config(config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (_ca, mut rx_a) = join(&mm, a, "alice").await;
        let (_cb, mut rx_b) = join(&mm, b, "bob").await;

        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMsg::QueueJoined { position: 1 }
        ));
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMsg::MatchFound { .. }
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerMsg::QueueJoined { position: 2 }
        ));
        let match_id = match rx_b.recv().await.unwrap() {
            ServerMsg::MatchFound { match_id, .. } => match_id,
            other => panic!("expected match_found, got {other:?}"),
        };

        advance(TokioDuration::from_millis(2_000)).await;

        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMsg::MatchStarted { .. }
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerMsg::MatchStarted { .. }
        ));

        advance(TokioDuration::from_millis(30_000)).await;

        match rx_a.recv().await.unwrap() {
            ServerMsg::MatchEnded {
                match_id: ended_id,
                winner_id,
                ..
            } => {
                assert_eq!(ended_id, match_id);
                assert_eq!(winner_id, None);
            }
            other => panic!("expected match_ended, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn s4_all_ready_starts_the_match_early() {
        let mm = spawn_with_config(config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (_ca, mut rx_a) = join(&mm, a, "alice").await;
        let (_cb, mut rx_b) = join(&mm, b, "bob").await;

        let match_id = loop {
            if let ServerMsg::MatchFound { match_id, .. } = rx_a.recv().await.unwrap() {
                break match_id;
            }
        };
        while !matches!(rx_b.recv().await.unwrap(), ServerMsg::MatchFound { .. }) {}

        let (tx_ready, mut rx_ready) = unbounded_channel();
        mm.send(Command::MarkReady {
            player_id: a,
            match_id,
            reply: tx_ready.clone(),
        })
        .await;
        mm.send(Command::MarkReady {
            player_id: b,
            match_id,
            reply: tx_ready,
        })
        .await;

        // started well before the 2s deferred-start delay would fire
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMsg::MatchStarted { .. }
        ));
        assert!(rx_ready.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_the_queue_before_pairing_is_acknowledged() {
        let mm = spawn_with_config(config());
        let a = Uuid::new_v4();
        let (_ca, mut rx_a) = join(&mm, a, "alice").await;
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMsg::QueueJoined { .. }
        ));

        let (tx, mut rx) = unbounded_channel();
        mm.send(Command::LeaveQueue {
            player_id: a,
            reply: tx,
        })
        .await;
        assert!(matches!(rx.recv().await.unwrap(), ServerMsg::QueueLeft {}));

        let snapshot = mm.health().await;
        assert_eq!(snapshot.queue_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_queue_without_having_joined_is_an_error() {
        let mm = spawn_with_config(config());
        let (tx, mut rx) = unbounded_channel();
        mm.send(Command::LeaveQueue {
            player_id: Uuid::new_v4(),
            reply: tx,
        })
        .await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMsg::Error { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_of_last_survivor_ends_the_match_with_no_winner() {
        let mm = spawn_with_config(config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (ca, mut rx_a) = join(&mm, a, "alice").await;
        let (_cb, mut rx_b) = join(&mm, b, "bob").await;

        let match_id = loop {
            if let ServerMsg::MatchFound { match_id, .. } = rx_a.recv().await.unwrap() {
                break match_id;
            }
        };
        while !matches!(rx_b.recv().await.unwrap(), ServerMsg::MatchFound { .. }) {}

        advance(TokioDuration::from_millis(2_000)).await;
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMsg::MatchStarted { .. }
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerMsg::MatchStarted { .. }
        ));

        mm.send(Command::Disconnect { connection_id: ca }).await;

        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ServerMsg::PlayerDisconnected { player_id } if player_id == a
        ));

        match rx_b.recv().await.unwrap() {
            ServerMsg::MatchEnded {
                match_id: ended_id,
                winner_id,
                ..
            } => {
                assert_eq!(ended_id, match_id);
                assert_eq!(winner_id, None);
            }
            other => panic!("expected match_ended, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tap_submitted_before_match_start_is_rejected() {
        let mm = spawn_with_config(config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (_ca, mut rx_a) = join(&mm, a, "alice").await;
        let (_cb, mut rx_b) = join(&mm, b, "bob").await;
        let match_id = loop {
            if let ServerMsg::MatchFound { match_id, .. } = rx_a.recv().await.unwrap() {
                break match_id;
            }
        };
        while !matches!(rx_b.recv().await.unwrap(), ServerMsg::MatchFound { .. }) {}

        let (tx, mut rx) = unbounded_channel();
        mm.send(Command::SubmitTap {
            player_id: a,
            match_id,
            client_timestamp_ms: unix_millis(),
            reply: tx,
        })
        .await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMsg::Error { .. }
        ));
    }
}
