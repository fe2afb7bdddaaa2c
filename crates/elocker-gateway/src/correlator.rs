//! Pairs one outstanding sensor request with the next inbound frame.
//!
//! The sensor bus has no request ids: whatever frame arrives while a
//! request is pending is its reply. Only one request may be pending at a
//! time; a second caller gets [`CorrelatorError::Busy`].

use elocker_protocol::SensorFrame;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::CorrelatorError;
use crate::link::LinkWriter;

#[derive(Debug, Default)]
struct Pending {
    next_ticket: u64,
    slot: Option<(u64, oneshot::Sender<SensorFrame>)>,
}

/// Request/response matcher for one sensor transport.
#[derive(Debug)]
pub struct Correlator {
    writer: LinkWriter,
    pending: Mutex<Pending>,
}

impl Correlator {
    pub fn new(writer: LinkWriter) -> Self {
        Self {
            writer,
            pending: Mutex::new(Pending::default()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a request waits for its reply.
    pub fn is_pending(&self) -> bool {
        self.pending().slot.is_some()
    }

    /// Send `request` and wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` when the write fails or nothing arrives in time.
    /// Dropping the future releases the pending slot.
    pub async fn send_and_wait(
        &self,
        request: &SensorFrame,
        timeout: Duration,
    ) -> Result<Option<SensorFrame>, CorrelatorError> {
        let (tx, rx) = oneshot::channel();
        let ticket = {
            let mut pending = self.pending();
            if pending.slot.is_some() {
                return Err(CorrelatorError::Busy);
            }
            pending.next_ticket = pending.next_ticket.wrapping_add(1);
            let ticket = pending.next_ticket;
            pending.slot = Some((ticket, tx));
            ticket
        };
        let _release = Release {
            correlator: self,
            ticket,
        };

        if let Err(e) = self.writer.write(request.to_bytes()).await {
            warn!(device_id = request.id(), error = %e, "Sensor request not sent");
            return Ok(None);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(Some(reply)),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                debug!(
                    device_id = request.id(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Sensor timeout"
                );
                Ok(None)
            }
        }
    }

    /// Hand an inbound frame to the pending request.
    ///
    /// Returns false when nobody was waiting; the frame is dropped.
    pub fn resolve(&self, frame: SensorFrame) -> bool {
        let waiter = self.pending().slot.take();
        match waiter {
            Some((_, tx)) => match tx.send(frame) {
                Ok(()) => true,
                Err(frame) => {
                    debug!(device_id = frame.id(), "No resolver for frame");
                    false
                }
            },
            None => {
                debug!(device_id = frame.id(), "No resolver for frame");
                false
            }
        }
    }
}

/// Clears the slot if it still belongs to `ticket`.
struct Release<'a> {
    correlator: &'a Correlator,
    ticket: u64,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut pending = self.correlator.pending();
        if pending
            .slot
            .as_ref()
            .is_some_and(|(ticket, _)| *ticket == self.ticket)
        {
            pending.slot = None;
        }
    }
}
