//! WebSocket transport over `tokio-tungstenite`.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use talkpush_core::ConnectError;
use tokio::net::TcpStream;
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{
    session_pair, ConnectTarget, Outbound, SessionDriver, SessionHandle, Transport,
    TransportEvent, CLOSE_ABNORMAL, CLOSE_NO_STATUS,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport: `ws://` or `wss://` endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, target: &ConnectTarget) -> Result<SessionHandle, ConnectError> {
        let hello = target.hello_frame()?;

        let connect = tokio_tungstenite::connect_async(target.endpoint.as_str());
        let mut ws = match tokio::time::timeout(target.connect_timeout, connect).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Err(connect_error(&target.endpoint, e)),
            Err(_elapsed) => return Err(ConnectError::Timeout(target.connect_timeout)),
        };

        ws.send(WsMessage::Text(hello.into()))
            .await
            .map_err(|e| ConnectError::Hello(e.to_string()))?;
        info!(endpoint = %target.endpoint, "WebSocket connected");

        let (handle, driver) = session_pair();
        tokio::spawn(pump(ws, driver, target.close_timeout));
        Ok(handle)
    }
}

fn connect_error(endpoint: &str, e: WsError) -> ConnectError {
    match e {
        WsError::Url(reason) => ConnectError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        },
        other => ConnectError::Handshake(other.to_string()),
    }
}

/// Moves frames between the socket and the session until the connection
/// ends, then reports exactly one terminal event.
///
/// Once our close frame is out the peer has `close_timeout` to answer. If the
/// session owner goes away the socket is dropped at once.
async fn pump(ws: WsStream, mut driver: SessionDriver, close_timeout: Duration) {
    let (mut write, mut read) = ws.split();
    let mut outbound_open = true;
    let mut close_code = CLOSE_NO_STATUS;
    let mut close_deadline: Option<Pin<Box<Sleep>>> = None;

    let terminal = loop {
        tokio::select! {
            biased;

            out = driver.outbound.recv(), if outbound_open => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                        break TransportEvent::Failed(e.to_string());
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    outbound_open = false;
                    debug!(code, reason = %reason, "Closing WebSocket");
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if write.send(WsMessage::Close(Some(frame))).await.is_err() {
                        break TransportEvent::Closed {
                            code,
                            reason: "close handshake failed".to_string(),
                        };
                    }
                    close_code = code;
                    close_deadline = Some(Box::pin(sleep(close_timeout)));
                }
                None => {
                    // every sender dropped
                    outbound_open = false;
                    driver.mark_closed();
                    if close_deadline.is_none() {
                        let _ = write.send(WsMessage::Close(None)).await;
                        close_deadline = Some(Box::pin(sleep(close_timeout)));
                    }
                }
            },

            _ = driver.events.closed() => {
                debug!("Session owner gone, dropping connection");
                driver.mark_closed();
                return;
            }

            _ = close_elapsed(&mut close_deadline) => {
                warn!(timeout = ?close_timeout, "Peer did not answer close, dropping connection");
                break TransportEvent::Closed {
                    code: close_code,
                    reason: "close handshake timed out".to_string(),
                };
            }

            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    let frame = TransportEvent::Frame(text.as_str().to_owned());
                    if driver.events.send(frame).await.is_err() {
                        debug!("Session owner gone, dropping connection");
                        driver.mark_closed();
                        return;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    debug!(len = data.len(), "Ignoring binary frame");
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    break TransportEvent::Closed { code, reason };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break TransportEvent::Failed(e.to_string());
                }
                None => {
                    break TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection dropped".to_string(),
                    };
                }
            },
        }
    };

    debug!(?terminal, "WebSocket session ended");
    driver.finish(terminal).await;
}

async fn close_elapsed(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
