//! Robot link: connection lifecycle, liveness probing and recovery.

pub mod client;
pub mod lifecycle;

pub use client::{
    Connector, LinkConfig, LinkEvent, LinkEventReceiver, LinkEventSender, RobotConnection,
    TcpConnector,
};
pub use lifecycle::{Lifecycle, TickAction};
