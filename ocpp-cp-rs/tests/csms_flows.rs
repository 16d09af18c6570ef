//! End-to-end flows against an in-process mock CSMS.
//!
//! Each test binds a local WebSocket listener, scripts the CSMS side frame
//! by frame, and drives the engine through its public API.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{Request, Response},
        http::HeaderValue,
        Message,
    },
    WebSocketStream,
};

use ocpp_cp::{
    AuthorizationStatus, ChargePoint, ChargePointHandler, ClientConfig, ErrorCode, Lifecycle,
    Measurand, OcppError,
};

type WsServer = WebSocketStream<TcpStream>;

struct NullHandler;

impl ChargePointHandler for NullHandler {
    fn meter_reading(&self, _connector_id: i32, _measurand: Measurand) -> Option<String> {
        Some("1250".to_string())
    }
    fn start_charging(&self, _connector_id: i32, _id_tag: &str) {}
    fn stop_charging(&self, _connector_id: i32) {}
    fn unlock_connector(&self, _connector_id: i32) {}
}

async fn bind_csms() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let config = ClientConfig::new("CP001", url).with_call_timeout(Duration::from_secs(5));
    (listener, config)
}

async fn accept(listener: &TcpListener) -> WsServer {
    let (stream, _) = listener.accept().await.unwrap();
    accept_hdr_async(stream, |_req: &Request, mut resp: Response| {
        resp.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static("ocpp1.6"),
        );
        Ok(resp)
    })
    .await
    .unwrap()
}

async fn next_frame(ws: &mut WsServer) -> Vec<Value> {
    loop {
        match ws.next().await.expect("stream ended").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(data) => ws.send(Message::Pong(data)).await.unwrap(),
            _ => {}
        }
    }
}

async fn send_frame(ws: &mut WsServer, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Answer the automatic BootNotification with Accepted.
async fn answer_boot(ws: &mut WsServer, interval: u32) {
    let call = next_frame(ws).await;
    assert_eq!(call[0], 2);
    assert_eq!(call[2], "BootNotification");
    assert_eq!(call[3]["chargePointVendor"], "Elektrokombinacija");

    send_frame(
        ws,
        json!([3, call[1], {
            "status": "Accepted",
            "currentTime": chrono::Utc::now().to_rfc3339(),
            "interval": interval,
        }]),
    )
    .await;
}

async fn wait_for_ready(cp: &ChargePoint) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while cp.lifecycle() != Lifecycle::Ready {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("engine did not reach READY");
}

#[tokio::test]
async fn boot_accepted_reaches_ready_and_adopts_interval() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;

    wait_for_ready(&cp).await;
    assert!(!cp.is_offline());
    assert_eq!(cp.heartbeat_interval(), Duration::from_secs(300));
}

#[tokio::test]
async fn remote_stop_for_unknown_transaction_is_rejected() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    send_frame(&mut ws, json!([2, "5", "RemoteStopTransaction", {"transactionId": 99}])).await;

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply, vec![json!(3), json!("5"), json!({"status": "Rejected"})]);
}

#[tokio::test]
async fn authorize_blocked_leaves_session_inactive() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    let session = cp.open_session();
    let csms = tokio::spawn(async move {
        let call = next_frame(&mut ws).await;
        assert_eq!(call[2], "Authorize");
        assert_eq!(call[3]["idTag"], "BADTAG");
        send_frame(
            &mut ws,
            json!([3, call[1], {"idTagInfo": {"status": "Blocked"}}]),
        )
        .await;
        ws
    });

    let err = cp
        .authorize(session, "BADTAG", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OcppError::AuthorizationFailed(AuthorizationStatus::Blocked)
    ));

    let info = cp.session_info(session).unwrap();
    assert!(!info.active);
    assert_eq!(info.last_auth, Some(AuthorizationStatus::Blocked));

    csms.await.unwrap();
}

#[tokio::test]
async fn csms_call_error_surfaces_to_caller() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    let session = cp.open_session();
    let csms = tokio::spawn(async move {
        let call = next_frame(&mut ws).await;
        assert_eq!(call[2], "Authorize");
        send_frame(
            &mut ws,
            json!([4, call[1], "InternalError", "database unavailable", {}]),
        )
        .await;
        ws
    });

    let err = cp
        .authorize(session, "ABC123", Duration::from_secs(5))
        .await
        .unwrap_err();
    match err {
        OcppError::Remote { code, description, .. } => {
            assert_eq!(code, ErrorCode::InternalError);
            assert_eq!(description, "database unavailable");
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    // The rejected CALL left no session side effects behind
    assert!(!cp.session_info(session).unwrap().active);
    csms.await.unwrap();
}

#[tokio::test]
async fn server_call_answered_while_client_call_in_flight() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    let session = cp.open_session();
    let csms = tokio::spawn(async move {
        // Hold the Authorize reply back and slip in a command of our own;
        // the reader must keep serving while the caller waits
        let call = next_frame(&mut ws).await;
        assert_eq!(call[2], "Authorize");

        send_frame(
            &mut ws,
            json!([2, "55", "GetConfiguration", {"key": ["HeartbeatInterval"]}]),
        )
        .await;
        let reply = next_frame(&mut ws).await;
        assert_eq!(reply[0], 3);
        assert_eq!(reply[1], "55");
        assert_eq!(reply[2]["configurationKey"][0]["value"], "300");

        // Only now answer the outstanding Authorize
        send_frame(
            &mut ws,
            json!([3, call[1], {"idTagInfo": {"status": "Accepted"}}]),
        )
        .await;
        ws
    });

    cp.authorize(session, "ABC123", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(cp.session_info(session).unwrap().active);
    csms.await.unwrap();
}

#[tokio::test]
async fn transaction_round_trip() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    let session = cp.open_session();

    let csms = tokio::spawn(async move {
        let call = next_frame(&mut ws).await;
        assert_eq!(call[2], "Authorize");
        send_frame(
            &mut ws,
            json!([3, call[1], {"idTagInfo": {"status": "Accepted"}}]),
        )
        .await;

        let call = next_frame(&mut ws).await;
        assert_eq!(call[2], "StartTransaction");
        assert_eq!(call[3]["connectorId"], 1);
        assert_eq!(call[3]["meterStart"], 100);
        send_frame(
            &mut ws,
            json!([3, call[1], {
                "transactionId": 42,
                "idTagInfo": {"status": "Accepted"},
            }]),
        )
        .await;

        let call = next_frame(&mut ws).await;
        assert_eq!(call[2], "StopTransaction");
        assert_eq!(call[3]["transactionId"], 42);
        assert_eq!(call[3]["meterStop"], 150);
        send_frame(&mut ws, json!([3, call[1], {}])).await;
        ws
    });

    cp.authorize(session, "ABC123", Duration::from_secs(5))
        .await
        .unwrap();
    cp.start_transaction(session, 1, 100, Duration::from_secs(5))
        .await
        .unwrap();

    let info = cp.session_info(session).unwrap();
    assert!(info.active);
    assert_eq!(info.transaction_id, Some(42));

    cp.stop_transaction(session, 150, Duration::from_secs(5))
        .await
        .unwrap();

    let info = cp.session_info(session).unwrap();
    assert!(!info.active);
    assert_eq!(info.transaction_id, None);

    csms.await.unwrap();
}

#[tokio::test]
async fn get_configuration_enumerates_full_table() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    send_frame(&mut ws, json!([2, "7", "GetConfiguration", {}])).await;

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply[0], 3);
    assert_eq!(reply[1], "7");

    let keys = reply[2]["configurationKey"].as_array().unwrap();
    assert_eq!(keys.len(), 24);
    assert_eq!(keys[0]["key"], "AllowOfflineTxForUnknownId");

    let heartbeat = keys
        .iter()
        .find(|kv| kv["key"] == "HeartbeatInterval")
        .unwrap();
    assert_eq!(heartbeat["value"], "300");
    assert_eq!(heartbeat["readonly"], false);
}

#[tokio::test]
async fn change_configuration_updates_heartbeat_cadence() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    send_frame(
        &mut ws,
        json!([2, "8", "ChangeConfiguration", {"key": "HeartbeatInterval", "value": "60"}]),
    )
    .await;

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply[2]["status"], "Accepted");
    assert_eq!(cp.heartbeat_interval(), Duration::from_secs(60));
}

#[tokio::test]
async fn offline_start_transaction_is_optimistic() {
    // No listener at this address; the engine stays offline
    let config = ClientConfig::new("CP001", "ws://127.0.0.1:9");
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    assert!(cp.is_offline());
    assert_eq!(cp.lifecycle(), Lifecycle::Init);

    let session = cp.open_session();
    cp.start_transaction(session, 1, 0, Duration::from_secs(1))
        .await
        .unwrap();

    let info = cp.session_info(session).unwrap();
    assert!(info.active);
    // No CSMS round trip happened, so no transaction id was assigned
    assert_eq!(info.transaction_id, None);

    // Stopping the never-reported transaction is a local no-op
    cp.stop_transaction(session, 10, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!cp.session_info(session).unwrap().active);
}

#[tokio::test]
async fn offline_authorize_follows_local_auth_key() {
    let config = ClientConfig::new("CP001", "ws://127.0.0.1:9");
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let session = cp.open_session();
    let err = cp
        .authorize(session, "ABC123", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, OcppError::Offline));

    cp.configuration()
        .update(ocpp_cp::ConfigKey::LocalAuthorizeOffline, "true")
        .unwrap();

    cp.authorize(session, "ABC123", Duration::from_secs(1))
        .await
        .unwrap();
    assert!(cp.session_info(session).unwrap().active);
}

#[tokio::test]
async fn offline_meter_values_are_refused() {
    let config = ClientConfig::new("CP001", "ws://127.0.0.1:9");
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let session = cp.open_session();
    cp.start_transaction(session, 1, 0, Duration::from_secs(1))
        .await
        .unwrap();

    let err = cp
        .meter_values(session, Measurand::EnergyActiveImportRegister, "1250")
        .await
        .unwrap_err();
    assert!(matches!(err, OcppError::Offline));
}

#[tokio::test]
async fn unhandled_action_answered_with_call_error() {
    let (listener, config) = bind_csms().await;
    let cp = ChargePoint::start(config, Arc::new(NullHandler));

    let mut ws = accept(&listener).await;
    answer_boot(&mut ws, 300).await;
    wait_for_ready(&cp).await;

    send_frame(&mut ws, json!([2, "9", "ClearCache", {}])).await;

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply[0], 4);
    assert_eq!(reply[1], "9");
    assert_eq!(reply[2], "NotImplemented");
}
