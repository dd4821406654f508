//! # wwks-core
//!
//! Core crate of the WWKS robot client, providing:
//!
//! - **Types** (`types`): message kinds, order and connection states, wire schema, stock records
//! - **Codec** (`codec`): XML encode/decode of WWKS envelopes via quick-xml
//! - **Requests** (`request`): builders for every outbound request
//! - **Framing** (`framing`): end-tag frame reassembly and outbound sanitising
//! - **Classification** (`classify`): message kind detection without full parsing
//! - **Correlation** (`correlation`): bracket-encoded article ids in request ids
//! - **Network** (`net`): robot connection with liveness probe and recovery
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `WwksError` via thiserror
//! - **Time utilities** (`time_util`): wire timestamps and request ids
//! - **Logging** (`logging`): tracing-based structured logging

pub mod classify;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod framing;
pub mod logging;
pub mod net;
pub mod request;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
