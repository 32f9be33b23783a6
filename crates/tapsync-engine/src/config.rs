use std::time::Duration;

/// Local timer settings for the role machines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub countdown_ticks: u8,
    pub tick_interval: Duration,
    /// Lifetime of a host-side tap marker.
    pub marker_ttl: Duration,
    /// Lifetime of a player-side tap ripple.
    pub ripple_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: 5,
            tick_interval: Duration::from_secs(1),
            marker_ttl: Duration::from_secs(2),
            ripple_ttl: Duration::from_secs(1),
        }
    }
}
