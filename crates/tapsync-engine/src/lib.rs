//! Host and player role state machines, and the tasks that drive them.
//!
//! The machines ([`HostMachine`], [`PlayerMachine`]) are synchronous and
//! take the current instant explicitly. [`HostSession`] and
//! [`PlayerSession`] each own one machine inside a single task that
//! serialises replies, broadcasts, connectivity changes and timers, and
//! publish the resulting view on a watch channel.

pub mod config;
pub mod countdown;
mod driver;
pub mod error;
pub mod host;
pub mod host_session;
pub mod join;
pub mod lifecycle;
pub mod markers;
pub mod player;
pub mod player_session;

pub use config::EngineConfig;
pub use countdown::{Countdown, CountdownTick};
pub use error::EngineError;
pub use host::{HostMachine, HostView, TapMarker};
pub use host_session::HostSession;
pub use join::join_session;
pub use lifecycle::Lifecycle;
pub use markers::{Marker, MarkerSet};
pub use player::{PlayerMachine, PlayerView, RejoinOutcome, Ripple, TapRequest};
pub use player_session::PlayerSession;
