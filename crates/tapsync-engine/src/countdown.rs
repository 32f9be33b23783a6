use std::time::Duration;

use tokio::time::Instant;

/// Result of advancing a [`Countdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownTick {
    Idle,
    Running(u8),
    Elapsed,
}

/// Fixed-length local lead-in. Never supplied by the session owner.
#[derive(Clone, Debug)]
pub struct Countdown {
    total: u8,
    interval: Duration,
    remaining: u8,
    next_tick: Option<Instant>,
}

impl Countdown {
    pub fn new(total: u8, interval: Duration) -> Self {
        Self {
            total,
            interval,
            remaining: 0,
            next_tick: None,
        }
    }

    /// Start from the full count, discarding any run in progress.
    pub fn start(&mut self, now: Instant) {
        self.remaining = self.total;
        self.next_tick = Some(if self.total == 0 {
            now
        } else {
            now + self.interval
        });
    }

    pub fn cancel(&mut self) {
        self.remaining = 0;
        self.next_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Ticks left while running.
    pub fn remaining(&self) -> Option<u8> {
        self.next_tick.map(|_| self.remaining)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Consume every tick due at `now`.
    pub fn tick(&mut self, now: Instant) -> CountdownTick {
        let Some(mut deadline) = self.next_tick else {
            return CountdownTick::Idle;
        };
        while self.remaining > 0 && deadline <= now {
            self.remaining -= 1;
            deadline += self.interval;
        }
        if self.remaining == 0 {
            self.next_tick = None;
            CountdownTick::Elapsed
        } else {
            self.next_tick = Some(deadline);
            CountdownTick::Running(self.remaining)
        }
    }
}
