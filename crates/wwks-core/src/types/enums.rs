//! Enumerations used throughout the WWKS client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Symbolic kind of an inbound WWKS document, decided by the name of the
/// first child element under the `WWKS` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    HelloResponse,
    StatusResponse,
    StockInfoResponse,
    OutputResponse,
    OutputMessage,
    InputMessage,
    TaskInfoResponse,
    /// Robot-initiated liveness check, answered by the connection itself.
    KeepAliveRequest,
    Unknown,
}

impl MessageKind {
    /// Every recognised kind, in classification priority order.
    pub const KNOWN: [MessageKind; 8] = [
        MessageKind::HelloResponse,
        MessageKind::StatusResponse,
        MessageKind::StockInfoResponse,
        MessageKind::OutputResponse,
        MessageKind::OutputMessage,
        MessageKind::InputMessage,
        MessageKind::TaskInfoResponse,
        MessageKind::KeepAliveRequest,
    ];

    /// Element name this kind appears as on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            Self::HelloResponse => "HelloResponse",
            Self::StatusResponse => "StatusResponse",
            Self::StockInfoResponse => "StockInfoResponse",
            Self::OutputResponse => "OutputResponse",
            Self::OutputMessage => "OutputMessage",
            Self::InputMessage => "InputMessage",
            Self::TaskInfoResponse => "TaskInfoResponse",
            Self::KeepAliveRequest => "KeepAliveRequest",
            Self::Unknown => "",
        }
    }

    /// Map an element name to a kind; anything unrecognised is `Unknown`.
    pub fn from_tag(tag: &[u8]) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|k| k.tag().as_bytes() == tag)
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            other => f.write_str(other.tag()),
        }
    }
}

// ---------------------------------------------------------------------------
// Output order lifecycle
// ---------------------------------------------------------------------------

/// State of a client-issued output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Request sent, robot has not acknowledged yet.
    Requested,
    Queued,
    Rejected,
    InProcess,
    /// Partially fulfilled; a targeted stock probe is pending.
    Incomplete,
    Completed,
    Aborted,
    Unknown,
}

impl OrderState {
    /// States after which the order leaves the order book.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Aborted | Self::Unknown)
    }

    /// UI colour associated with an order in this state.
    pub fn display(self) -> DisplayState {
        match self {
            Self::Requested | Self::Queued => DisplayState::Blue,
            Self::Rejected | Self::Incomplete => DisplayState::Red,
            Self::InProcess => DisplayState::Orange,
            Self::Completed => DisplayState::Green,
            Self::Aborted | Self::Unknown => DisplayState::Purple,
        }
    }
}

impl FromStr for OrderState {
    type Err = String;

    /// Parse a wire `Status` attribute. `Requested` is client-side only and
    /// never appears on the wire.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(Self::Queued),
            "Rejected" => Ok(Self::Rejected),
            "InProcess" => Ok(Self::InProcess),
            "Incomplete" => Ok(Self::Incomplete),
            "Completed" => Ok(Self::Completed),
            "Aborted" => Ok(Self::Aborted),
            "Unknown" => Ok(Self::Unknown),
            other => Err(format!("unrecognised order status '{other}'")),
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which inbound message is driving an order transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    OutputResponse,
    OutputMessage,
    TaskInfoResponse,
}

impl OrderState {
    /// Whether an order in `self` accepts a move to `next` driven by `via`.
    ///
    /// Terminal orders accept nothing. A `Requested` order only moves through
    /// an `OutputResponse` (to `Queued`/`Rejected`) or a `TaskInfoResponse`.
    pub fn accepts(self, via: Trigger, next: OrderState) -> bool {
        if self.is_terminal() || next == Self::Requested {
            return false;
        }
        match via {
            Trigger::OutputResponse => {
                matches!(self, Self::Requested | Self::Queued)
                    && matches!(next, Self::Queued | Self::Rejected)
            }
            Trigger::OutputMessage => {
                matches!(self, Self::Queued | Self::InProcess | Self::Incomplete)
                    && matches!(next, Self::Incomplete | Self::Completed)
            }
            Trigger::TaskInfoResponse => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Display state
// ---------------------------------------------------------------------------

/// Colour code attached to a stock row, derived by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DisplayState {
    /// Resting state of a row with stock and no order activity.
    #[default]
    Purple,
    Blue,
    Orange,
    Red,
    Green,
    /// Depleted or freshly re-probed row.
    Neutral,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Lifecycle state of the robot connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Liveness probe failed; recovery is in progress.
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}
