use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{ExecutionError, ZoneError, ZoneResult};

use super::bus::StreamRegistry;
use super::events::{SubscriptionId, ZoneEvent};

/// A channel-backed subscription to the event bus.
///
/// Dropping this stream unregisters it. Events published while the buffer is
/// full are dropped for this stream only.
#[derive(Debug)]
pub struct EventStream {
    subscription_id: SubscriptionId,
    rx: Receiver<ZoneEvent>,
    registry: Weak<StreamRegistry>,
    unregistered: AtomicBool,
}

impl EventStream {
    pub(crate) fn new(subscription_id: SubscriptionId, rx: Receiver<ZoneEvent>, registry: Weak<StreamRegistry>) -> Self {
        Self {
            subscription_id,
            rx,
            registry,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Explicit unregistration.
    ///
    /// Idempotent. Events already buffered can still be received; after that
    /// the stream reports disconnected.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.subscription_id);
        }
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Disconnected`] once the stream is unsubscribed
    /// (or the bus dropped) and the buffer is empty.
    pub fn recv(&self) -> ZoneResult<ZoneEvent> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Timeout`] if nothing arrives in time, or
    /// [`ExecutionError::Disconnected`] as for [`EventStream::recv`].
    pub fn recv_timeout(&self, timeout: Duration) -> ZoneResult<ZoneEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ZoneError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Next buffered event, if any; never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Disconnected`] when the stream is closed and empty.
    pub fn try_recv(&self) -> ZoneResult<Option<ZoneEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// All currently buffered events.
    #[must_use]
    pub fn drain(&self) -> Vec<ZoneEvent> {
        self.rx.try_iter().collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

fn disconnected() -> ZoneError {
    ZoneError::Execution(ExecutionError::Disconnected {
        path: "event_stream".to_string(),
    })
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
