//! Outbound delivery: the connection state machine, the transport seam,
//! and the loop that drains the event queue onto the collector connection.

pub mod channel;
pub mod connection;
pub mod connector;
pub mod stats;

pub use channel::{DeliveryChannel, DeliveryConfig};
pub use connection::{AtomicConnectionState, ConnectionEvent, ConnectionState, InvalidTransition};
pub use connector::{Connector, TcpConnector};
pub use stats::{DeliveryStats, DeliveryStatsSnapshot};
