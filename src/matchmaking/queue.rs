//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::registry::ConnectionId;

/// Connection waiting for an opponent
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub connection_id: ConnectionId,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// The matchmaking queue, strictly first-in first-out
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player to the back of the queue. Returns false if already queued.
    pub fn enqueue(&mut self, player: QueuedPlayer) -> bool {
        if self.contains(&player.connection_id) {
            return false;
        }
        self.queue.push_back(player);
        true
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, connection_id: ConnectionId) -> Option<QueuedPlayer> {
        let pos = self
            .queue
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        self.queue.remove(pos)
    }

    /// Return a player to the head of the queue
    pub fn push_front(&mut self, player: QueuedPlayer) {
        if !self.contains(&player.connection_id) {
            self.queue.push_front(player);
        }
    }

    /// Check if a player is in the queue
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.queue.iter().any(|p| &p.connection_id == connection_id)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the two longest-waiting players, if there are two
    pub fn try_pair(&mut self) -> Option<(QueuedPlayer, QueuedPlayer)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn pairs_in_arrival_order() {
        let ids: Vec<ConnectionId> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut queue = MatchmakingQueue::new();

        assert!(queue.enqueue(QueuedPlayer::new(ids[0])));
        assert!(queue.try_pair().is_none());
        assert!(queue.enqueue(QueuedPlayer::new(ids[1])));
        assert!(queue.enqueue(QueuedPlayer::new(ids[2])));

        let (a, b) = queue.try_pair().unwrap();
        assert_eq!((a.connection_id, b.connection_id), (ids[0], ids[1]));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(&ids[2]));
        assert!(queue.try_pair().is_none());
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let id = Uuid::new_v4();
        let mut queue = MatchmakingQueue::new();
        assert!(queue.enqueue(QueuedPlayer::new(id)));
        assert!(!queue.enqueue(QueuedPlayer::new(id)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dequeue_removes_only_that_player() {
        let ids: Vec<ConnectionId> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut queue = MatchmakingQueue::new();
        for id in &ids {
            queue.enqueue(QueuedPlayer::new(*id));
        }

        assert!(queue.dequeue(ids[1]).is_some());
        assert!(queue.dequeue(ids[1]).is_none());
        let (a, b) = queue.try_pair().unwrap();
        assert_eq!((a.connection_id, b.connection_id), (ids[0], ids[2]));
        assert!(queue.is_empty());
    }
}
