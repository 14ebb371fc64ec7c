//! Optional broadcast sink for pool events.

use pool_core::PoolEvent;
use tokio::sync::broadcast;

/// Default buffer for event subscribers; slow subscribers see `Lagged`.
pub const EVENT_BUFFER: usize = 1024;

/// Broadcaster that silently drops events when nobody listens.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventTx(Option<broadcast::Sender<PoolEvent>>);

impl EventTx {
    pub(crate) fn new(tx: broadcast::Sender<PoolEvent>) -> Self {
        Self(Some(tx))
    }

    /// Broadcast an event.
    pub(crate) fn emit(&self, event: PoolEvent) {
        if let Some(ref tx) = self.0 {
            let _ = tx.send(event);
        }
    }
}
