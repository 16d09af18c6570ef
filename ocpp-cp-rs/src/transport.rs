//! WebSocket transport and reconnect manager
//!
//! Owns the socket for the life of the engine: connects with the `ocpp1.6`
//! subprotocol, pumps outbound frames from the writer channel, feeds inbound
//! frames to the PDU processor, and answers ping with pong. Any stream
//! error or close flips the engine offline and the loop reconnects with
//! exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        handshake::client::Request,
        http::{header, Uri},
        protocol::WebSocketConfig,
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::chargepoint::{EngineInner, Lifecycle};
use crate::dispatcher::InternalEvent;
use crate::error::OcppError;

/// OCPP 1.6J WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect/reconnect loop. Runs until the engine (and with it the writer
/// channel) is dropped.
pub(crate) async fn run_transport(engine: Arc<EngineInner>, mut writer: mpsc::Receiver<String>) {
    let mut reconnect_delay = engine.config.reconnect_delay;

    loop {
        info!("connecting to CSMS: {}", engine.config.endpoint_url());

        match connect(&engine).await {
            Ok(ws) => {
                reconnect_delay = engine.config.reconnect_delay;
                engine.set_offline(false);

                // Kick the boot sequence on every fresh link until READY
                if engine.lifecycle() != Lifecycle::Ready {
                    engine.enqueue(InternalEvent::BootNotification);
                }

                match serve_connection(&engine, ws, &mut writer).await {
                    Ok(()) => info!("connection closed by CSMS"),
                    Err(e) => warn!("connection lost: {}", e),
                }

                engine.set_offline(true);
                engine.rpc.fail_pending();
            }
            Err(e) => {
                error!("connect failed: {}", e);
            }
        }

        if writer.is_closed() {
            debug!("engine dropped, transport stopping");
            return;
        }

        info!("reconnecting in {:?}", reconnect_delay);
        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = std::cmp::min(reconnect_delay * 2, engine.config.max_reconnect_delay);
    }
}

/// Open the WebSocket with the OCPP subprotocol header.
async fn connect(engine: &EngineInner) -> Result<WsStream, OcppError> {
    let url = engine.config.endpoint_url();
    let uri: Uri = url.parse().map_err(|_| OcppError::InvalidFormat)?;

    let request = Request::builder()
        .uri(&url)
        .header(header::SEC_WEBSOCKET_PROTOCOL, OCPP_SUBPROTOCOL)
        .header(header::HOST, uri.host().unwrap_or("localhost"))
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, "13")
        .header(
            header::SEC_WEBSOCKET_KEY,
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .map_err(|_| OcppError::InvalidFormat)?;

    let ws_config = WebSocketConfig {
        max_message_size: Some(64 * 1024),
        max_frame_size: Some(16 * 1024),
        ..Default::default()
    };

    let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false)
        .await
        .map_err(|e| OcppError::Transport(e.to_string()))?;

    let accepted = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok());

    if accepted != Some(OCPP_SUBPROTOCOL) {
        warn!("CSMS did not accept {} subprotocol, got: {:?}", OCPP_SUBPROTOCOL, accepted);
    }

    info!("connected to {}", url);
    Ok(ws_stream)
}

/// Pump one connection until it errors or closes.
async fn serve_connection(
    engine: &Arc<EngineInner>,
    ws: WsStream,
    writer: &mut mpsc::Receiver<String>,
) -> Result<(), OcppError> {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outbound = writer.recv() => {
                match outbound {
                    Some(text) => {
                        debug!("sending: {}", text);
                        sink.send(Message::Text(text.into()))
                            .await
                            .map_err(|e| OcppError::Transport(e.to_string()))?;
                    }
                    // Engine dropped
                    None => return Ok(()),
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        debug!("received: {}", text);
                        engine.clone().process_frame(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        sink.send(Message::Pong(data))
                            .await
                            .map_err(|e| OcppError::Transport(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(OcppError::Transport(e.to_string())),
                    None => return Err(OcppError::ConnectionClosed),
                }
            }
        }
    }
}
