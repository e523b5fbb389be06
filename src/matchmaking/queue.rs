//! The waiting queue: an ordered list of players available to be paired (spec §3)

use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// A player waiting in the matchmaking queue, together with the connection
/// state the Matchmaker needs to carry them into a Match if one forms.
#[derive(Clone)]
pub struct QueuedPlayer {
    pub user_id: Uuid,
    pub display_name: String,
    pub connection_id: Uuid,
    pub reply: UnboundedSender<ServerMsg>,
}

impl QueuedPlayer {
    pub fn new(
        user_id: Uuid,
        display_name: String,
        connection_id: Uuid,
        reply: UnboundedSender<ServerMsg>,
    ) -> Self {
        Self {
            user_id,
            display_name,
            connection_id,
            reply,
        }
    }
}

/// FIFO waiting list; each player id appears at most once.
#[derive(Default)]
pub struct Queue {
    entries: VecDeque<QueuedPlayer>,
}

impl Queue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a player to the back of the queue.
    ///
    /// Callers must check `contains` first; joinQueue's `AlreadyQueued` error
    /// is the Matchmaker's responsibility, not the Queue's.
    pub fn enqueue(&mut self, player: QueuedPlayer) {
        self.entries.push_back(player);
    }

    /// Remove a player from the queue, wherever they sit.
    pub fn dequeue(&mut self, user_id: Uuid) -> Option<QueuedPlayer> {
        let pos = self.entries.iter().position(|p| p.user_id == user_id)?;
        self.entries.remove(pos)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.entries.iter().any(|p| p.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position (1-based) of a player in the queue, if present.
    pub fn position(&self, user_id: Uuid) -> Option<usize> {
        self.entries
            .iter()
            .position(|p| p.user_id == user_id)
            .map(|idx| idx + 1)
    }

    /// Remove and return up to `count` players from the front, in FIFO order.
    pub fn drain_front(&mut self, count: usize) -> Vec<QueuedPlayer> {
        let take = count.min(self.entries.len());
        self.entries.drain(..take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(user_id: Uuid, name: &str) -> QueuedPlayer {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        QueuedPlayer::new(user_id, name.to_string(), Uuid::new_v4(), tx)
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = Queue::new();
        let a = Uuid::new_v4();
        q.enqueue(queued(a, "a"));
        q.enqueue(queued(Uuid::new_v4(), "b"));

        let drained = q.drain_front(1);
        assert_eq!(drained[0].user_id, a);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn position_is_one_based() {
        let mut q = Queue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.enqueue(queued(a, "a"));
        q.enqueue(queued(b, "b"));

        assert_eq!(q.position(a), Some(1));
        assert_eq!(q.position(b), Some(2));
    }

    #[test]
    fn dequeue_removes_regardless_of_position() {
        let mut q = Queue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.enqueue(queued(a, "a"));
        q.enqueue(queued(b, "b"));

        assert!(q.dequeue(a).is_some());
        assert!(!q.contains(a));
        assert!(q.contains(b));
    }

    #[test]
    fn leave_then_rejoin_restores_pre_call_indices() {
        // L1: joinQueue(p); leaveQueue(p) equals the pre-call state
        let mut q = Queue::new();
        let p = Uuid::new_v4();
        assert_eq!(q.len(), 0);

        q.enqueue(queued(p, "p"));
        q.dequeue(p);

        assert_eq!(q.len(), 0);
        assert!(!q.contains(p));
    }
}
