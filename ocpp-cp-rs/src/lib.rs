//! # OCPP Charge Point Engine
//!
//! OCPP 1.6J client-side protocol engine for an EV charge point controller.
//!
//! The engine speaks the OCPP JSON-RPC framing over WebSocket towards a
//! Central System Management System (CSMS): it originates the charge point
//! lifecycle traffic (BootNotification, Heartbeat, Authorize,
//! Start/StopTransaction, MeterValues) and answers CSMS-initiated commands
//! (GetConfiguration, ChangeConfiguration, RemoteStart/StopTransaction,
//! UnlockConnector).
//!
//! ## Architecture
//!
//! ```text
//! OCPP CSMS (Backend)
//!       │ WebSocket JSON-RPC (ocpp1.6)
//!       ▼
//! ┌───────────────────────────────────────┐
//! │  transport: connect / reconnect loop  │
//! └──────┬─────────────────────────▲──────┘
//!        │ inbound frames          │ outbound frames
//!        ▼                         │
//! ┌────────────┐   ┌───────────────┴─────┐
//! │ frame /    │   │ rpc: one in-flight  │
//! │ dispatch   │──►│ CALL, correlation   │
//! └─────┬──────┘   └─────────────────────┘
//!       │ events
//!       ▼
//! ┌────────────────────────────────────────┐
//! │ dispatcher: boot / heartbeat / meters  │
//! │ sessions │ configuration keys          │
//! └────────────────────────────────────────┘
//! ```
//!
//! Concurrency model: one CALL in flight at a time (the OCPP processing
//! rule), a bounded internal event queue drained by a single dispatcher
//! worker, and watch-driven timers that re-arm when the CSMS changes an
//! interval key. No global state; each [`ChargePoint`] is self-contained.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ocpp_cp::{ChargePoint, ChargePointHandler, ClientConfig, Measurand};
//!
//! struct Controller;
//!
//! impl ChargePointHandler for Controller {
//!     fn meter_reading(&self, _connector: i32, m: Measurand) -> Option<String> {
//!         (m == Measurand::EnergyActiveImportRegister).then(|| "1250".to_string())
//!     }
//!     fn start_charging(&self, _connector: i32, _id_tag: &str) {}
//!     fn stop_charging(&self, _connector: i32) {}
//!     fn unlock_connector(&self, _connector: i32) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("CP001", "ws://localhost:8180/steve/websocket/CentralSystemService");
//!     let cp = ChargePoint::start(config, Arc::new(Controller));
//!
//!     let session = cp.open_session();
//!     cp.authorize(session, "ABC123", Duration::from_secs(30)).await?;
//!     cp.start_transaction(session, 1, 0, Duration::from_secs(30)).await?;
//!     Ok(())
//! }
//! ```

pub mod chargepoint;
pub mod config;
pub mod error;
pub mod frame;
pub mod keys;
pub mod session;
pub mod types;

mod dispatcher;
mod rpc;
mod transport;

pub use chargepoint::{ChargePoint, ChargePointHandler, Lifecycle};
pub use config::ClientConfig;
pub use error::{ErrorCode, OcppError};
pub use frame::{Action, Call, CallError, CallResult, OcppMessage};
pub use keys::{ConfigKey, KeyStore, KeyVal};
pub use session::{SessionId, SessionInfo};

// Re-export the wire types callers touch directly
pub use types::{
    AuthorizationStatus, IdTagInfo, KeyValue, Measurand, MeterValue, ReadingContext,
    RegistrationStatus, SampledValue, UnitOfMeasure,
};
