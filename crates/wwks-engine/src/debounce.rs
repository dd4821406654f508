//! Cancellable delay for exploratory queries.
//!
//! Each [`Debouncer::schedule`] supersedes the previous one: the earlier
//! timer is aborted, and its value is discarded even if it already fired
//! before the abort landed, because only the newest generation is current.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// A value whose delay elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub generation: u64,
    pub value: T,
}

pub struct Debouncer<T> {
    delay: Duration,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Fired<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<Fired<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            generation: 0,
            pending: None,
            tx,
        };
        (debouncer, rx)
    }

    /// Deliver `value` after the delay unless superseded or cancelled.
    pub fn schedule(&mut self, value: T) {
        self.cancel();
        self.generation += 1;
        let fired = Fired {
            generation: self.generation,
            value,
        };
        let tx = self.tx.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fired);
        }));
    }

    /// Drop the pending value. Returns whether one was waiting.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.pending.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    /// Whether `fired` is the latest scheduled value.
    pub fn is_current(&self, fired: &Fired<T>) -> bool {
        fired.generation == self.generation
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
