//! RPC correlation engine
//!
//! Serializes outbound CALLs against a single in-flight slot: a caller
//! acquires the slot, registers a oneshot for the response, transmits, and
//! waits. At most one CALL is ever outstanding, so the pending "table" is a
//! single slot and correlation ids are a plain monotonic counter. RESULT and
//! ERROR frames the engine itself originates bypass the slot entirely, since
//! the CSMS never answers them.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::OcppError;
use crate::frame::{Action, Call, CallError, CallResult};

struct PendingCall {
    unique_id: String,
    response_tx: oneshot::Sender<Result<Value, OcppError>>,
}

pub(crate) struct RpcCorrelator {
    /// One in-flight CALL at a time
    call_slot: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingCall>>,
    next_uid: AtomicU64,
    writer: mpsc::Sender<String>,
    offline: Arc<AtomicBool>,
}

impl RpcCorrelator {
    pub fn new(writer: mpsc::Sender<String>, offline: Arc<AtomicBool>) -> Self {
        Self {
            call_slot: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            next_uid: AtomicU64::new(1),
            writer,
            offline,
        }
    }

    fn allocate_uid(&self) -> String {
        self.next_uid.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Issue a CALL and wait for the matching RESULT. The timeout bounds
    /// both the slot acquisition and the response wait; the slot is released
    /// unconditionally on return.
    pub async fn call(
        &self,
        action: Action,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, OcppError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(OcppError::Offline);
        }

        let _slot = tokio::time::timeout(timeout, self.call_slot.lock())
            .await
            .map_err(|_| OcppError::Timeout)?;

        let unique_id = self.allocate_uid();
        let (response_tx, response_rx) = oneshot::channel();
        *self.pending.lock() = Some(PendingCall {
            unique_id: unique_id.clone(),
            response_tx,
        });

        let frame = Call::new(unique_id.clone(), action, payload)?.to_text()?;
        if self.writer.send(frame).await.is_err() {
            self.pending.lock().take();
            return Err(OcppError::ConnectionClosed);
        }

        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(OcppError::ConnectionClosed),
            Err(_) => {
                // A result arriving after this point finds no pending entry
                // and is dropped by the reader.
                self.pending.lock().take();
                Err(OcppError::Timeout)
            }
        }
    }

    /// Issue a CALL without waiting for the response (MeterValues). Still
    /// takes the slot so frames never interleave with an awaited CALL.
    pub async fn call_no_wait(
        &self,
        action: Action,
        payload: Value,
        timeout: Duration,
    ) -> Result<(), OcppError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(OcppError::Offline);
        }

        let _slot = tokio::time::timeout(timeout, self.call_slot.lock())
            .await
            .map_err(|_| OcppError::Timeout)?;

        let frame = Call::new(self.allocate_uid(), action, payload)?.to_text()?;
        self.writer
            .send(frame)
            .await
            .map_err(|_| OcppError::ConnectionClosed)
    }

    /// Transmit a RESULT frame answering a CSMS-initiated CALL.
    pub async fn send_result(&self, result: CallResult) -> Result<(), OcppError> {
        self.writer
            .send(result.to_text()?)
            .await
            .map_err(|_| OcppError::ConnectionClosed)
    }

    /// Transmit an ERROR frame answering a CSMS-initiated CALL.
    pub async fn send_error(&self, error: CallError) -> Result<(), OcppError> {
        self.writer
            .send(error.to_text()?)
            .await
            .map_err(|_| OcppError::ConnectionClosed)
    }

    /// Complete the pending CALL with a response or remote error. Returns
    /// false if no CALL with that id is waiting (late or unsolicited frame).
    pub fn complete(&self, unique_id: &str, outcome: Result<Value, OcppError>) -> bool {
        let mut pending = self.pending.lock();
        match pending.as_ref() {
            Some(p) if p.unique_id == unique_id => {
                let p = pending.take().expect("checked above");
                // Receiver may have timed out between the check and here
                let _ = p.response_tx.send(outcome);
                true
            }
            _ => {
                debug!(unique_id, "no pending call for response, dropping");
                false
            }
        }
    }

    /// Fail the pending CALL, if any, when the connection drops.
    pub fn fail_pending(&self) {
        if let Some(p) = self.pending.lock().take() {
            let _ = p.response_tx.send(Err(OcppError::ConnectionClosed));
        }
    }
}
