//! Self-expiring cosmetic markers (tap flashes, ripples).

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq)]
pub struct Marker<T> {
    pub id: u64,
    pub payload: T,
    pub expires_at: Instant,
}

/// Markers share one lifetime, so insertion order is expiry order.
#[derive(Clone, Debug)]
pub struct MarkerSet<T> {
    ttl: Duration,
    next_id: u64,
    markers: VecDeque<Marker<T>>,
}

impl<T> MarkerSet<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_id: 1,
            markers: VecDeque::new(),
        }
    }

    pub fn spawn(&mut self, payload: T, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.markers.push_back(Marker {
            id,
            payload,
            expires_at: now + self.ttl,
        });
        id
    }

    /// Drop every marker whose deadline has passed. Returns how many went.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.markers.len();
        while self.markers.front().is_some_and(|m| m.expires_at <= now) {
            let _ = self.markers.pop_front();
        }
        before - self.markers.len()
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.markers.front().map(|m| m.expires_at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker<T>> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }
}
