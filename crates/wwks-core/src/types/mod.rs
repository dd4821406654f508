//! Core data types: message kinds, order and display states, wire schema,
//! and the stock/order records owned by the reconciliation engine.

pub mod enums;
pub mod message;
pub mod stock;

pub use enums::*;
pub use message::*;
pub use stock::*;
