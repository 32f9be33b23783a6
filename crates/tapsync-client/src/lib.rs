//! Client side of the session channel.
//!
//! Three layers over one duplex transport:
//! - [`ConnectionManager`] owns the link, reconnects, and publishes
//!   [`Connectivity`] on a watch channel.
//! - [`Gateway`] correlates requests with replies and fans broadcasts out to
//!   subscribers. The two dispatch tables are kept apart.
//! - [`SessionClient`] is the typed façade returning [`Call`]s that resolve to
//!   the uniform `SessionResult` shape.

pub mod connection;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod session_client;
pub mod transport;
pub mod ws;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connectivity, ReconnectPolicy,
};
pub use error::TransportError;
pub use gateway::{Gateway, SubscriptionId};
pub use memory::{InboundRequest, MemoryPeer, MemoryServer, MemoryTransport, PeerHandle};
pub use session_client::{Call, SessionClient};
pub use transport::{Link, Transport};
pub use ws::WsTransport;
