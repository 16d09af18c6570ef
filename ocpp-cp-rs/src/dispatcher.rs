//! Internal event bus and timers
//!
//! A single worker drains a bounded FIFO of internal events: timer-driven
//! boot/heartbeat/metering cycles and the asynchronous halves of
//! CSMS-initiated commands. Queue admission happens with `try_send` at the
//! producer, where a full queue becomes the protocol-level "Rejected"; once
//! admitted an event is never dropped. Timer tasks only enqueue, they never
//! block on network work themselves.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chargepoint::{EngineInner, Lifecycle};

/// Depth of the internal event queue
pub(crate) const EVENT_QUEUE_DEPTH: usize = 16;

/// Events consumed by the dispatcher worker
#[derive(Debug)]
pub(crate) enum InternalEvent {
    /// Attempt (or retry) the boot notification
    BootNotification,
    /// Periodic heartbeat tick; doubles as boot retry until READY
    Heartbeat,
    /// Periodic metering sweep over all active sessions
    SampleMeters,
    RemoteStart {
        connector_id: i32,
        id_tag: String,
    },
    RemoteStop {
        connector_id: i32,
        transaction_id: i32,
    },
    Unlock {
        connector_id: i32,
    },
}

/// Drain the event queue until the engine is dropped.
pub(crate) async fn run_dispatcher(
    engine: Arc<EngineInner>,
    mut events: mpsc::Receiver<InternalEvent>,
) {
    while let Some(event) = events.recv().await {
        debug!(?event, "dispatching internal event");
        match event {
            InternalEvent::BootNotification => {
                engine.boot_attempt().await;
            }
            InternalEvent::Heartbeat => {
                if engine.lifecycle() == Lifecycle::Ready {
                    engine.heartbeat_tick().await;
                } else {
                    // Boot not through yet, the tick is a retry
                    engine.boot_attempt().await;
                }
            }
            InternalEvent::SampleMeters => {
                engine.sample_all_meters().await;
            }
            InternalEvent::RemoteStart {
                connector_id,
                id_tag,
            } => {
                // Ack already went out at admission; outcome is local only
                engine.handler.start_charging(connector_id, &id_tag);
            }
            InternalEvent::RemoteStop {
                connector_id,
                transaction_id,
            } => {
                debug!(transaction_id, "remote stop");
                engine.handler.stop_charging(connector_id);
            }
            InternalEvent::Unlock { connector_id } => {
                engine.handler.unlock_connector(connector_id);
            }
        }
    }
    debug!("dispatcher stopped");
}

/// Heartbeat/boot-retry timer task. Sleeps the watch-driven period, then
/// enqueues a tick; a period change re-arms the sleep immediately.
pub(crate) async fn run_heartbeat_timer(
    events: mpsc::Sender<InternalEvent>,
    mut interval: watch::Receiver<Duration>,
) {
    loop {
        let period = *interval.borrow_and_update();
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                if events.try_send(InternalEvent::Heartbeat).is_err() {
                    warn!("event queue full, heartbeat tick dropped");
                }
            }
            changed = interval.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Reference-counted periodic metering timer, shared by all active
/// transactions. Armed on the first acquire, disarmed when the count drops
/// to zero, re-armed in place when `MeterValueSampleInterval` changes.
pub(crate) struct MeterTimer {
    refcount: Mutex<u32>,
    task: Mutex<Option<JoinHandle<()>>>,
    interval: watch::Sender<Duration>,
}

impl MeterTimer {
    pub fn new(initial: Duration) -> Self {
        let (interval, _) = watch::channel(initial);
        Self {
            refcount: Mutex::new(0),
            task: Mutex::new(None),
            interval,
        }
    }

    /// Take a reference; arms the timer on the first holder.
    pub fn acquire(&self, events: mpsc::Sender<InternalEvent>) {
        let mut count = self.refcount.lock();
        *count += 1;
        if *count == 1 {
            let mut interval = self.interval.subscribe();
            let handle = tokio::spawn(async move {
                loop {
                    let period = *interval.borrow_and_update();
                    if period.is_zero() {
                        // Interval 0 disables sampling until changed
                        if interval.changed().await.is_err() {
                            break;
                        }
                        continue;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(period) => {
                            if events.try_send(InternalEvent::SampleMeters).is_err() {
                                warn!("event queue full, metering tick dropped");
                            }
                        }
                        changed = interval.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            *self.task.lock() = Some(handle);
        }
    }

    /// Drop a reference; stops the timer with the last holder.
    pub fn release(&self) {
        let mut count = self.refcount.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            if let Some(handle) = self.task.lock().take() {
                handle.abort();
            }
        }
    }

    /// Change the period; a running timer re-arms without a restart.
    pub fn rearm(&self, period: Duration) {
        self.interval.send_replace(period);
    }

    pub fn armed(&self) -> bool {
        *self.refcount.lock() > 0
    }

    pub fn period(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Stop the timer task outright (engine shutdown).
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}
