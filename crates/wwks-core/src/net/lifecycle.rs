//! Connection state machine, free of I/O.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Degraded -> Connecting
//!      ^              |             |                        |
//!      +--------------+-------------+------------------------+
//! ```
//!
//! The link task drives it from socket results and probe ticks and performs
//! whatever [`TickAction`] it returns.

use crate::types::ConnectionState;

/// What the link should do on a probe tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Write the zero-effect liveness byte.
    Probe,
    /// Attempt one connect.
    Reconnect,
    /// A connect is already in progress.
    Idle,
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    state: ConnectionState,
    liveness: u64,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of probes issued; only ever increases.
    pub fn liveness(&self) -> u64 {
        self.liveness
    }

    pub fn on_tick(&mut self) -> TickAction {
        match self.state {
            ConnectionState::Connected => {
                self.liveness += 1;
                TickAction::Probe
            }
            ConnectionState::Disconnected | ConnectionState::Degraded => TickAction::Reconnect,
            ConnectionState::Connecting => TickAction::Idle,
        }
    }

    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Outcome of a connect attempt, handshake included.
    pub fn on_connect_result(&mut self, ok: bool) {
        self.state = if ok {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
    }

    /// A write on a live connection failed. Returns whether recovery applies.
    pub fn on_write_failed(&mut self) -> bool {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Degraded;
            true
        } else {
            false
        }
    }

    /// Peer closed the stream or a read failed.
    pub fn on_stream_closed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_probe() {
        let mut life = Lifecycle::new();
        assert_eq!(life.state(), ConnectionState::Disconnected);
        assert_eq!(life.on_tick(), TickAction::Reconnect);

        life.begin_connect();
        assert_eq!(life.on_tick(), TickAction::Idle);
        life.on_connect_result(true);
        assert_eq!(life.state(), ConnectionState::Connected);

        assert_eq!(life.on_tick(), TickAction::Probe);
        assert_eq!(life.on_tick(), TickAction::Probe);
        assert_eq!(life.liveness(), 2);
    }

    #[test]
    fn failed_connect_stays_disconnected() {
        let mut life = Lifecycle::new();
        life.begin_connect();
        life.on_connect_result(false);
        assert_eq!(life.state(), ConnectionState::Disconnected);
        assert_eq!(life.liveness(), 0);
    }

    #[test]
    fn probe_failure_degrades_only_when_connected() {
        let mut life = Lifecycle::new();
        assert!(!life.on_write_failed());

        life.begin_connect();
        life.on_connect_result(true);
        assert!(life.on_write_failed());
        assert_eq!(life.state(), ConnectionState::Degraded);
        assert_eq!(life.on_tick(), TickAction::Reconnect);
    }

    #[test]
    fn liveness_survives_reconnect() {
        let mut life = Lifecycle::new();
        life.begin_connect();
        life.on_connect_result(true);
        life.on_tick();
        life.on_stream_closed();
        life.begin_connect();
        life.on_connect_result(true);
        life.on_tick();
        assert_eq!(life.liveness(), 2);
    }
}
