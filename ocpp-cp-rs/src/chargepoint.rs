//! Charge point engine and public API
//!
//! Ties the pieces together: the engine context owns the configuration-key
//! store, the session registry, the RPC correlator and the internal event
//! queue; `ChargePoint` is the handle the host application drives. No global
//! state: several engines can coexist in one process.
//!
//! ```text
//! host app ──► ChargePoint ──► RpcCorrelator ──► transport writer
//! CSMS ──► transport reader ──► process_frame ──► session update
//!                                   │                / RESULT reply
//!                                   └──► event queue ──► dispatcher
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatcher::{
    run_dispatcher, run_heartbeat_timer, InternalEvent, MeterTimer, EVENT_QUEUE_DEPTH,
};
use crate::error::{ErrorCode, OcppError};
use crate::frame::{Action, Call, CallError, CallResult, OcppMessage};
use crate::keys::{ConfigKey, KeyStore, KeyVal};
use crate::rpc::RpcCorrelator;
use crate::session::{SessionId, SessionInfo, SessionRegistry};
use crate::transport::run_transport;
use crate::types::*;

/// Charge point lifecycle; only ever advances forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Not yet announced to the CSMS
    Init,
    /// BootNotification sent, not accepted
    BootNotified,
    /// Registration accepted, heartbeats running
    Ready,
}

/// Host-application callbacks. The engine calls these from the dispatcher
/// task; implementations should hand off long-running work.
pub trait ChargePointHandler: Send + Sync {
    /// Current reading for one measurand, pre-formatted for the wire.
    /// `None` when the meter cannot supply the measurand.
    fn meter_reading(&self, connector_id: i32, measurand: Measurand) -> Option<String>;

    /// Begin delivering energy on a connector (remote start). The outcome
    /// is not reported back to the CSMS; the ack went out at admission.
    fn start_charging(&self, connector_id: i32, id_tag: &str);

    /// Stop delivering energy on a connector (remote stop).
    fn stop_charging(&self, connector_id: i32);

    /// Unlock the connector latch (remote unlock).
    fn unlock_connector(&self, connector_id: i32);
}

/// Shared engine context, one per charge point instance.
pub(crate) struct EngineInner {
    pub(crate) config: ClientConfig,
    pub(crate) keys: KeyStore,
    pub(crate) sessions: SessionRegistry,
    pub(crate) rpc: RpcCorrelator,
    pub(crate) events: mpsc::Sender<InternalEvent>,
    pub(crate) handler: Arc<dyn ChargePointHandler>,
    pub(crate) meter_timer: MeterTimer,
    offline: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
    heartbeat_interval: watch::Sender<Duration>,
}

impl EngineInner {
    pub(crate) fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    fn advance_lifecycle(&self, to: Lifecycle) {
        let mut state = self.lifecycle.lock();
        if to > *state {
            debug!(?to, "lifecycle advanced");
            *state = to;
        }
    }

    pub(crate) fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Admit an event to the internal queue. A full queue is the caller's
    /// "Rejected".
    pub(crate) fn enqueue(&self, event: InternalEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!("internal event queue full, event rejected");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound frame processing (reader task context)
    // ------------------------------------------------------------------

    /// Route one inbound frame. Call handling is spawned so the reader loop
    /// never waits on the writer channel it shares with the reply path.
    pub(crate) fn process_frame(self: Arc<Self>, text: &str) {
        match OcppMessage::parse(text) {
            Ok(OcppMessage::Call(call)) => {
                tokio::spawn(async move {
                    self.handle_server_call(call).await;
                });
            }
            Ok(OcppMessage::CallResult(result)) => {
                if !self.rpc.complete(&result.unique_id, Ok(result.payload)) {
                    debug!(unique_id = %result.unique_id, "unmatched CALLRESULT dropped");
                }
            }
            Ok(OcppMessage::CallError(error)) => {
                let unique_id = error.unique_id.clone();
                let matched = self.rpc.complete(
                    &unique_id,
                    Err(OcppError::Remote {
                        code: error.error_code,
                        description: error.error_description,
                        details: error.error_details,
                    }),
                );
                if !matched {
                    debug!(%unique_id, "unmatched CALLERROR dropped");
                }
            }
            Err(e) => {
                // A bad frame is dropped; the connection stays up
                warn!("discarding unparseable frame: {}", e);
            }
        }
    }

    async fn handle_server_call(&self, call: Call) {
        let unique_id = call.unique_id.clone();

        let reply = match call.action {
            Action::GetConfiguration => self.on_get_configuration(&call),
            Action::ChangeConfiguration => self.on_change_configuration(&call),
            Action::RemoteStartTransaction => self.on_remote_start(&call),
            Action::RemoteStopTransaction => self.on_remote_stop(&call),
            Action::UnlockConnector => self.on_unlock(&call),
            _ => Err(OcppError::UnknownAction(call.action.to_string())),
        };

        let outcome = match reply {
            Ok(result) => self.rpc.send_result(result).await,
            Err(OcppError::UnknownAction(action)) => {
                info!(%action, "answering unhandled action with NotImplemented");
                self.rpc
                    .send_error(CallError::new(
                        unique_id,
                        ErrorCode::NotImplemented,
                        format!("{} not supported", action),
                    ))
                    .await
            }
            Err(e) => {
                warn!("rejecting malformed request: {}", e);
                self.rpc
                    .send_error(CallError::new(
                        unique_id,
                        ErrorCode::FormationViolation,
                        e.to_string(),
                    ))
                    .await
            }
        };

        if let Err(e) = outcome {
            warn!("failed to send reply: {}", e);
        }
    }

    fn on_get_configuration(&self, call: &Call) -> Result<CallResult, OcppError> {
        let req: GetConfigurationRequest = serde_json::from_value(call.payload.clone())?;

        let resp = match req.key.filter(|k| !k.is_empty()) {
            // No key list: enumerate the whole table in order
            None => GetConfigurationResponse {
                configuration_key: Some(self.keys.all_key_values()),
                unknown_key: None,
            },
            Some(names) => {
                let mut known = Vec::new();
                let mut unknown = Vec::new();
                for name in names {
                    match ConfigKey::from_name(&name) {
                        Some(key) => known.push(self.keys.key_value(key)),
                        None => unknown.push(name),
                    }
                }
                GetConfigurationResponse {
                    configuration_key: (!known.is_empty()).then_some(known),
                    unknown_key: (!unknown.is_empty()).then_some(unknown),
                }
            }
        };

        CallResult::new(call.unique_id.clone(), resp)
    }

    fn on_change_configuration(&self, call: &Call) -> Result<CallResult, OcppError> {
        let req: ChangeConfigurationRequest = serde_json::from_value(call.payload.clone())?;

        let status = match ConfigKey::from_name(&req.key) {
            None => ConfigurationStatus::NotSupported,
            Some(key) => match self.keys.update(key, &req.value) {
                Ok(()) => {
                    self.apply_key_side_effects(key);
                    ConfigurationStatus::Accepted
                }
                // Read-only or type violation
                Err(_) => ConfigurationStatus::Rejected,
            },
        };

        info!(key = %req.key, ?status, "change configuration");
        CallResult::new(
            call.unique_id.clone(),
            ChangeConfigurationResponse { status },
        )
    }

    /// Interval keys drive live timers; a write re-arms them in place.
    fn apply_key_side_effects(&self, key: ConfigKey) {
        match key {
            ConfigKey::MeterValueSampleInterval => {
                let secs = self.keys.get_int(ConfigKey::MeterValueSampleInterval);
                self.meter_timer.rearm(Duration::from_secs(secs as u64));
            }
            ConfigKey::HeartbeatInterval => {
                let secs = self.keys.get_int(ConfigKey::HeartbeatInterval);
                if secs > 0 && self.lifecycle() == Lifecycle::Ready {
                    self.heartbeat_interval
                        .send_replace(Duration::from_secs(secs as u64));
                }
            }
            _ => {}
        }
    }

    fn on_remote_start(&self, call: &Call) -> Result<CallResult, OcppError> {
        let req: RemoteStartTransactionRequest = serde_json::from_value(call.payload.clone())?;
        let connector_id = req.connector_id.unwrap_or(1);

        let admitted = self.enqueue(InternalEvent::RemoteStart {
            connector_id,
            id_tag: req.id_tag,
        });

        let status = if admitted {
            RemoteStartStopStatus::Accepted
        } else {
            RemoteStartStopStatus::Rejected
        };
        CallResult::new(
            call.unique_id.clone(),
            RemoteStartTransactionResponse { status },
        )
    }

    fn on_remote_stop(&self, call: &Call) -> Result<CallResult, OcppError> {
        let req: RemoteStopTransactionRequest = serde_json::from_value(call.payload.clone())?;

        let status = match self.sessions.find_by_transaction(req.transaction_id) {
            None => {
                info!(
                    transaction_id = req.transaction_id,
                    "remote stop for unknown transaction"
                );
                RemoteStartStopStatus::Rejected
            }
            Some((_, slot)) => {
                let connector_id = slot.lock().connector_id.unwrap_or(1);
                if self.enqueue(InternalEvent::RemoteStop {
                    connector_id,
                    transaction_id: req.transaction_id,
                }) {
                    RemoteStartStopStatus::Accepted
                } else {
                    RemoteStartStopStatus::Rejected
                }
            }
        };

        CallResult::new(
            call.unique_id.clone(),
            RemoteStopTransactionResponse { status },
        )
    }

    fn on_unlock(&self, call: &Call) -> Result<CallResult, OcppError> {
        let req: UnlockConnectorRequest = serde_json::from_value(call.payload.clone())?;

        let status = if self.enqueue(InternalEvent::Unlock {
            connector_id: req.connector_id,
        }) {
            UnlockStatus::Unlocked
        } else {
            UnlockStatus::UnlockFailed
        };

        CallResult::new(call.unique_id.clone(), UnlockConnectorResponse { status })
    }

    // ------------------------------------------------------------------
    // Dispatcher-driven actions
    // ------------------------------------------------------------------

    /// Boot attempt from the dispatcher; errors are logged, the timer
    /// retries until the CSMS accepts.
    pub(crate) async fn boot_attempt(&self) {
        if self.is_offline() || self.lifecycle() == Lifecycle::Ready {
            return;
        }
        match self.do_boot(self.config.call_timeout).await {
            Ok(()) => {}
            Err(e) => warn!("boot notification failed, will retry: {}", e),
        }
    }

    pub(crate) async fn do_boot(&self, timeout: Duration) -> Result<(), OcppError> {
        let req = BootNotificationRequest {
            charge_point_vendor: self.config.vendor.clone(),
            charge_point_model: self.config.model.clone(),
            charge_point_serial_number: self.config.serial_number.clone(),
            firmware_version: self.config.firmware_version.clone(),
        };
        let payload = serde_json::to_value(req)?;

        let value = self
            .rpc
            .call(Action::BootNotification, payload, timeout)
            .await?;
        let resp: BootNotificationResponse = serde_json::from_value(value)?;

        self.advance_lifecycle(Lifecycle::BootNotified);

        // The returned interval is the heartbeat period once accepted, the
        // retry period otherwise
        if resp.interval > 0 {
            self.keys
                .set(ConfigKey::HeartbeatInterval, KeyVal::Int(resp.interval as i32));
            self.heartbeat_interval
                .send_replace(Duration::from_secs(resp.interval as u64));
        }

        match resp.status {
            RegistrationStatus::Accepted => {
                self.advance_lifecycle(Lifecycle::Ready);
                info!(interval = resp.interval, "registered with CSMS");
                Ok(())
            }
            other => {
                info!(?other, "boot notification not accepted");
                Err(OcppError::BootRejected(other))
            }
        }
    }

    pub(crate) async fn heartbeat_tick(&self) {
        if self.is_offline() {
            return;
        }
        match self.do_heartbeat(self.config.call_timeout).await {
            Ok(time) => debug!(%time, "heartbeat acknowledged"),
            Err(e) => warn!("heartbeat failed: {}", e),
        }
    }

    pub(crate) async fn do_heartbeat(
        &self,
        timeout: Duration,
    ) -> Result<DateTime<Utc>, OcppError> {
        let payload = serde_json::to_value(HeartbeatRequest {})?;
        let value = self.rpc.call(Action::Heartbeat, payload, timeout).await?;
        let resp: HeartbeatResponse = serde_json::from_value(value)?;
        Ok(resp.current_time)
    }

    /// Metering sweep: one MeterValues CALL per active session and
    /// configured measurand the host meter can supply.
    pub(crate) async fn sample_all_meters(&self) {
        if self.is_offline() {
            return;
        }

        let measurands = self.configured_measurands();
        if measurands.is_empty() {
            return;
        }

        for (id, slot) in self.sessions.active_sessions() {
            let (connector, transaction_id) = {
                let s = slot.lock();
                (s.connector_id, s.transaction_id)
            };
            let Some(connector_id) = connector else {
                continue;
            };

            for measurand in &measurands {
                let Some(value) = self.handler.meter_reading(connector_id, *measurand) else {
                    continue;
                };
                if let Err(e) = self
                    .send_meter_sample(connector_id, transaction_id, *measurand, value)
                    .await
                {
                    warn!(%id, "meter sample not sent: {}", e);
                }
            }
        }
    }

    pub(crate) async fn send_meter_sample(
        &self,
        connector_id: i32,
        transaction_id: Option<i32>,
        measurand: Measurand,
        value: String,
    ) -> Result<(), OcppError> {
        let req = MeterValuesRequest {
            connector_id,
            transaction_id,
            meter_value: vec![MeterValue {
                timestamp: Utc::now(),
                sampled_value: vec![SampledValue {
                    value,
                    context: Some(ReadingContext::SamplePeriodic),
                    measurand: Some(measurand),
                    unit: Some(measurand.unit()),
                }],
            }],
        };
        let payload = serde_json::to_value(req)?;
        // The CSMS does not answer MeterValues in a way we wait on
        self.rpc
            .call_no_wait(Action::MeterValues, payload, self.config.call_timeout)
            .await
    }

    fn configured_measurands(&self) -> Vec<Measurand> {
        self.keys
            .get(ConfigKey::MeterValuesSampledData)
            .to_wire()
            .split(',')
            .filter_map(|name| Measurand::from_wire_name(name.trim()))
            .collect()
    }
}

/// Handle to a running charge point engine.
pub struct ChargePoint {
    inner: Arc<EngineInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChargePoint {
    /// Spawn the engine: transport/reconnect loop, dispatcher worker and
    /// heartbeat timer. Requires a running tokio runtime.
    pub fn start(config: ClientConfig, handler: Arc<dyn ChargePointHandler>) -> Self {
        let offline = Arc::new(AtomicBool::new(true));
        let (writer_tx, writer_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (heartbeat_tx, heartbeat_rx) = watch::channel(config.boot_retry_delay);

        let keys = KeyStore::new();
        keys.set(
            ConfigKey::NumberOfConnectors,
            KeyVal::Int(config.connector_count as i32),
        );
        let meter_period =
            Duration::from_secs(keys.get_int(ConfigKey::MeterValueSampleInterval) as u64);

        let inner = Arc::new(EngineInner {
            rpc: RpcCorrelator::new(writer_tx, offline.clone()),
            keys,
            sessions: SessionRegistry::new(),
            events: events_tx.clone(),
            handler,
            meter_timer: MeterTimer::new(meter_period),
            offline,
            lifecycle: Mutex::new(Lifecycle::Init),
            heartbeat_interval: heartbeat_tx,
            config,
        });

        let tasks = vec![
            tokio::spawn(run_transport(inner.clone(), writer_rx)),
            tokio::spawn(run_dispatcher(inner.clone(), events_rx)),
            tokio::spawn(run_heartbeat_timer(events_tx, heartbeat_rx)),
        ];

        Self { inner, tasks }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle()
    }

    pub fn is_offline(&self) -> bool {
        self.inner.is_offline()
    }

    /// Current heartbeat period (boot retry period until READY).
    pub fn heartbeat_interval(&self) -> Duration {
        *self.inner.heartbeat_interval.borrow()
    }

    /// The configuration-key store (host-side read/write access).
    pub fn configuration(&self) -> &KeyStore {
        &self.inner.keys
    }

    pub fn session_info(&self, id: SessionId) -> Option<SessionInfo> {
        self.inner.sessions.snapshot(id)
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    pub fn open_session(&self) -> SessionId {
        let id = self.inner.sessions.open();
        debug!(%id, "session opened");
        id
    }

    /// Remove a session. A stale handle is a no-op returning false.
    pub fn close_session(&self, id: SessionId) -> bool {
        let removed = self.inner.sessions.close(id);
        if removed {
            debug!(%id, "session closed");
        }
        removed
    }

    // ------------------------------------------------------------------
    // CP-initiated operations
    // ------------------------------------------------------------------

    /// Announce the charge point; on acceptance the lifecycle reaches
    /// READY and the heartbeat period follows the CSMS-reported interval.
    pub async fn boot_notification(&self, timeout: Duration) -> Result<(), OcppError> {
        self.inner.do_boot(timeout).await
    }

    /// Heartbeat round trip; returns the CSMS clock.
    pub async fn heartbeat(&self, timeout: Duration) -> Result<DateTime<Utc>, OcppError> {
        self.inner.do_heartbeat(timeout).await
    }

    /// Present an idTag for authorization. Offline behavior follows the
    /// LocalAuthorizeOffline key: local accept when set, refusal otherwise.
    pub async fn authorize(
        &self,
        session: SessionId,
        id_tag: &str,
        timeout: Duration,
    ) -> Result<(), OcppError> {
        let slot = self
            .inner
            .sessions
            .get(session)
            .ok_or(OcppError::SessionNotFound)?;
        slot.lock().id_tag = id_tag.to_string();

        if self.inner.is_offline() {
            if self.inner.keys.get_bool(ConfigKey::LocalAuthorizeOffline) {
                let mut s = slot.lock();
                s.last_auth = Some(AuthorizationStatus::Accepted);
                s.active = true;
                info!(%session, "locally authorized while offline");
                return Ok(());
            }
            return Err(OcppError::Offline);
        }

        let payload = serde_json::to_value(AuthorizeRequest {
            id_tag: id_tag.to_string(),
        })?;
        let value = self.inner.rpc.call(Action::Authorize, payload, timeout).await?;
        let resp: AuthorizeResponse = serde_json::from_value(value)?;

        let status = resp.id_tag_info.status;
        {
            let mut s = slot.lock();
            s.last_auth = Some(status);
            if status == AuthorizationStatus::Accepted {
                s.active = true;
            }
        }

        match status {
            AuthorizationStatus::Accepted => Ok(()),
            other => Err(OcppError::AuthorizationFailed(other)),
        }
    }

    /// Start a transaction on a connector. While offline the transaction is
    /// accepted locally with no CSMS round trip; no reconciliation happens
    /// on reconnect.
    pub async fn start_transaction(
        &self,
        session: SessionId,
        connector_id: i32,
        meter_start: i32,
        timeout: Duration,
    ) -> Result<(), OcppError> {
        let slot = self
            .inner
            .sessions
            .get(session)
            .ok_or(OcppError::SessionNotFound)?;
        slot.lock().connector_id = Some(connector_id);

        if self.inner.is_offline() {
            slot.lock().active = true;
            info!(%session, connector_id, "transaction accepted locally while offline");
            return Ok(());
        }

        let id_tag = slot.lock().id_tag.clone();
        let payload = serde_json::to_value(StartTransactionRequest {
            connector_id,
            id_tag,
            meter_start,
            timestamp: Utc::now(),
            reservation_id: None,
        })?;
        let value = self
            .inner
            .rpc
            .call(Action::StartTransaction, payload, timeout)
            .await?;
        let resp: StartTransactionResponse = serde_json::from_value(value)?;

        let status = resp.id_tag_info.status;
        {
            let mut s = slot.lock();
            s.last_auth = Some(status);
            if status == AuthorizationStatus::Accepted {
                s.active = true;
                s.transaction_id = Some(resp.transaction_id);
                if !s.metering {
                    s.metering = true;
                    self.inner.meter_timer.acquire(self.inner.events.clone());
                }
            }
        }

        match status {
            AuthorizationStatus::Accepted => {
                info!(%session, transaction_id = resp.transaction_id, "transaction started");
                Ok(())
            }
            other => Err(OcppError::AuthorizationFailed(other)),
        }
    }

    /// Stop a transaction. The active flag and metering cadence are cleared
    /// before any network work so billing never outlives the transaction,
    /// even on failure.
    pub async fn stop_transaction(
        &self,
        session: SessionId,
        meter_stop: i32,
        timeout: Duration,
    ) -> Result<(), OcppError> {
        let slot = self
            .inner
            .sessions
            .get(session)
            .ok_or(OcppError::SessionNotFound)?;

        let (had_metering, transaction_id, id_tag) = {
            let mut s = slot.lock();
            s.active = false;
            let had_metering = s.metering;
            s.metering = false;
            (had_metering, s.transaction_id.take(), s.id_tag.clone())
        };
        if had_metering {
            self.inner.meter_timer.release();
        }

        if self.inner.is_offline() {
            info!(%session, "transaction stopped locally while offline");
            return Ok(());
        }

        // Transactions accepted optimistically offline never got a CSMS
        // transaction id; there is nothing to report.
        let Some(transaction_id) = transaction_id else {
            return Ok(());
        };

        let payload = serde_json::to_value(StopTransactionRequest {
            transaction_id,
            meter_stop,
            timestamp: Utc::now(),
            id_tag: (!id_tag.is_empty()).then_some(id_tag),
            reason: None,
        })?;
        let value = self
            .inner
            .rpc
            .call(Action::StopTransaction, payload, timeout)
            .await?;
        let _resp: StopTransactionResponse = serde_json::from_value(value)?;

        info!(%session, transaction_id, "transaction stopped");
        Ok(())
    }

    /// Push one meter reading for the session's connector. Refused while
    /// offline; the CSMS does not answer MeterValues, so this does not
    /// block on a response.
    pub async fn meter_values(
        &self,
        session: SessionId,
        measurand: Measurand,
        value: impl Into<String>,
    ) -> Result<(), OcppError> {
        let slot = self
            .inner
            .sessions
            .get(session)
            .ok_or(OcppError::SessionNotFound)?;

        if self.inner.is_offline() {
            return Err(OcppError::Offline);
        }

        let (connector, transaction_id) = {
            let s = slot.lock();
            (s.connector_id, s.transaction_id)
        };
        let connector_id = connector.ok_or(OcppError::NoTransaction)?;

        self.inner
            .send_meter_sample(connector_id, transaction_id, measurand, value.into())
            .await
    }
}

impl Drop for ChargePoint {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.inner.meter_timer.stop();
    }
}
