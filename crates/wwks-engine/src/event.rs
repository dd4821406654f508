//! Event types emitted by the engine to its consumers (UI, runner).
//!
//! Consumers register through [`EventBus::subscribe`] and receive every event
//! published afterwards. A subscription lives as long as its receiver;
//! dropped receivers are pruned on the next publish.

use wwks_core::{ConnectionState, DisplayState, OrderState};

/// A typed notification raised by reconciliation or the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A stock row changed quantity or display state.
    ArticleChanged {
        article_id: String,
        quantity: u32,
        display: DisplayState,
    },

    /// An output order changed state. Terminal states are reported once,
    /// after which the order is no longer tracked.
    OrderChanged {
        order_id: String,
        article_id: String,
        state: OrderState,
    },

    /// Robot link state or robot status text changed.
    ConnectivityChanged {
        state: ConnectionState,
        /// Human-readable robot status, e.g. `ROB1 [Ready]`.
        status_text: String,
    },
}

/// Sender half of an engine event subscription.
pub type EngineEventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

/// Receiver half of an engine event subscription.
pub type EngineEventReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineEvent>;

/// Fan-out of engine events to registered subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<EngineEventSender>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> EngineEventReceiver {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: EngineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
