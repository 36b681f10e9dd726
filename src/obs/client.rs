//! obs-websocket v5 client
//!
//! One WebSocket connection, used for request/response only. Requests are
//! serialized through an async mutex; each waits for the response carrying
//! its own request id and skips anything else (events, late responses).

use super::protocol::{
    auth_response, op, CurrentProgramScene, Envelope, Hello, Identified, Identify, Request,
    RequestResponse, SceneList, VersionInfo, RPC_VERSION,
};
use super::SceneTransport;
use crate::config::ObsConfig;
use crate::error::TransportError;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code OBS sends when the Identify authentication is wrong
const CLOSE_AUTH_FAILED: u16 = 4009;

/// Scene transport backed by an OBS WebSocket connection
pub struct ObsClient {
    config: ObsConfig,
    stream: Mutex<Option<WsStream>>,
    next_id: AtomicU64,
}

impl ObsClient {
    /// Create a client without connecting; the first request connects
    pub fn new(config: ObsConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect and identify, failing fast if OBS is unreachable
    pub async fn connect(config: &ObsConfig) -> Result<Self, TransportError> {
        let client = Self::new(config.clone());
        let stream = handshake(&client.config).await?;
        *client.stream.lock().await = Some(stream);
        Ok(client)
    }

    /// OBS and obs-websocket versions
    pub async fn version(&self) -> Result<VersionInfo, TransportError> {
        let data = self.request("GetVersion", None).await?;
        decode("GetVersion", data)
    }

    /// Close the connection if open
    pub async fn disconnect(&self) {
        if let Some(mut ws) = self.stream.lock().await.take() {
            if let Err(e) = ws.close(None).await {
                tracing::debug!("Error closing OBS connection: {}", e);
            }
        }
    }

    /// Send a request and return its response data
    ///
    /// Reconnects once if the connection turns out to be closed.
    pub async fn request(
        &self,
        request_type: &str,
        data: Option<Value>,
    ) -> Result<Value, TransportError> {
        let mut guard = self.stream.lock().await;

        for attempt in 0..2 {
            if guard.is_none() {
                *guard = Some(handshake(&self.config).await?);
            }
            let ws = match guard.as_mut() {
                Some(ws) => ws,
                None => return Err(TransportError::Closed),
            };

            let request_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
            match self.exchange(ws, request_type, &request_id, data.clone()).await {
                Err(e) if e.is_disconnect() && attempt == 0 => {
                    tracing::warn!("OBS connection lost ({}), reconnecting", e);
                    *guard = None;
                }
                Err(e @ TransportError::Timeout(_)) => {
                    // The stream may still deliver the late response; start clean
                    *guard = None;
                    return Err(e);
                }
                result => return result,
            }
        }

        Err(TransportError::Closed)
    }

    /// Send one request on an open stream and wait for its response
    async fn exchange(
        &self,
        ws: &mut WsStream,
        request_type: &str,
        request_id: &str,
        data: Option<Value>,
    ) -> Result<Value, TransportError> {
        let request = Request {
            request_type: request_type.to_string(),
            request_id: request_id.to_string(),
            request_data: data,
        };
        tracing::trace!("OBS request {} ({})", request_type, request_id);

        let timeout = Duration::from_secs(self.config.request_timeout);
        let exchange = async {
            send(ws, op::REQUEST, &request).await?;
            loop {
                let envelope = read_envelope(ws).await?;
                if envelope.op != op::REQUEST_RESPONSE {
                    continue;
                }
                let response: RequestResponse = envelope
                    .payload()
                    .map_err(|e| TransportError::Protocol(e.to_string()))?;
                if response.request_id != request_id {
                    tracing::debug!("Skipping stale OBS response {}", response.request_id);
                    continue;
                }
                if !response.request_status.result {
                    return Err(TransportError::Request {
                        request_type: response.request_type,
                        code: response.request_status.code,
                        comment: response.request_status.comment.unwrap_or_default(),
                    });
                }
                return Ok(response.response_data.unwrap_or(Value::Null));
            }
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.config.request_timeout))?
    }
}

#[async_trait::async_trait]
impl SceneTransport for ObsClient {
    async fn list_scenes(&self) -> Result<Vec<String>, TransportError> {
        let data = self.request("GetSceneList", None).await?;
        let list: SceneList = decode("GetSceneList", data)?;
        Ok(list.scenes.into_iter().map(|s| s.scene_name).collect())
    }

    async fn current_scene(&self) -> Result<String, TransportError> {
        let data = self.request("GetCurrentProgramScene", None).await?;
        let current: CurrentProgramScene = decode("GetCurrentProgramScene", data)?;
        Ok(current.current_program_scene_name)
    }

    async fn set_scene(&self, name: &str) -> Result<(), TransportError> {
        self.request("SetCurrentProgramScene", Some(json!({ "sceneName": name })))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "obs-websocket"
    }
}

/// Open the socket and run the Hello/Identify exchange
async fn handshake(config: &ObsConfig) -> Result<WsStream, TransportError> {
    let url = config.url();
    let timeout = Duration::from_secs(config.connect_timeout);

    let identify = async {
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connection(format!("{} ({})", url, e)))?;

        let hello: Hello = read_op(&mut ws, op::HELLO).await?;
        tracing::debug!(
            "OBS WebSocket {} (rpc {})",
            hello.obs_web_socket_version,
            hello.rpc_version
        );

        let authentication = match hello.authentication {
            Some(_) if config.password.is_empty() => {
                return Err(TransportError::Auth(
                    "OBS requires a password but none is configured".to_string(),
                ));
            }
            Some(ref challenge) => Some(auth_response(&config.password, challenge)),
            None => None,
        };

        send(
            &mut ws,
            op::IDENTIFY,
            &Identify {
                rpc_version: RPC_VERSION,
                authentication,
                event_subscriptions: 0,
            },
        )
        .await?;

        let identified: Identified = read_op(&mut ws, op::IDENTIFIED).await?;
        tracing::info!(
            "Connected to OBS at {} (rpc {})",
            url,
            identified.negotiated_rpc_version
        );
        Ok::<WsStream, TransportError>(ws)
    };

    tokio::time::timeout(timeout, identify)
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
}

/// Serialize and send one message
async fn send<T: serde::Serialize>(
    ws: &mut WsStream,
    opcode: u8,
    payload: &T,
) -> Result<(), TransportError> {
    let envelope =
        Envelope::new(opcode, payload).map_err(|e| TransportError::Protocol(e.to_string()))?;
    let text =
        serde_json::to_string(&envelope).map_err(|e| TransportError::Protocol(e.to_string()))?;
    ws.send(Message::Text(text)).await?;
    Ok(())
}

/// Read the next JSON message, skipping pings and binary frames
async fn read_envelope(ws: &mut WsStream) -> Result<Envelope, TransportError> {
    loop {
        let message = match ws.next().await {
            Some(message) => message?,
            None => return Err(TransportError::Closed),
        };

        match message {
            Message::Text(text) => {
                return serde_json::from_str(&text)
                    .map_err(|e| TransportError::Protocol(format!("{}: {}", e, text)));
            }
            Message::Close(Some(frame)) => {
                let code = u16::from(frame.code);
                return Err(if code == CLOSE_AUTH_FAILED {
                    TransportError::Auth(frame.reason.to_string())
                } else if frame.code == CloseCode::Normal {
                    TransportError::Closed
                } else {
                    TransportError::Protocol(format!(
                        "OBS closed the connection ({}): {}",
                        code, frame.reason
                    ))
                });
            }
            Message::Close(None) => return Err(TransportError::Closed),
            _ => continue,
        }
    }
}

/// Read until a message with the expected opcode arrives
async fn read_op<T: for<'de> serde::Deserialize<'de>>(
    ws: &mut WsStream,
    opcode: u8,
) -> Result<T, TransportError> {
    loop {
        let envelope = read_envelope(ws).await?;
        if envelope.op == opcode {
            return envelope
                .payload()
                .map_err(|e| TransportError::Protocol(e.to_string()));
        }
        tracing::trace!("Skipping OBS message op {} while waiting for {}", envelope.op, opcode);
    }
}

/// Decode response data for a request type
fn decode<T: for<'de> serde::Deserialize<'de>>(
    request_type: &str,
    data: Value,
) -> Result<T, TransportError> {
    serde_json::from_value(data)
        .map_err(|e| TransportError::Protocol(format!("{} response: {}", request_type, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_connect() {
        let client = ObsClient::new(ObsConfig::default());
        assert_eq!(client.name(), "obs-websocket");
        assert_eq!(client.config.url(), "ws://localhost:4455");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ObsConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: 2,
            ..ObsConfig::default()
        };
        let err = ObsClient::connect(&config).await.err().unwrap();
        assert!(err.is_disconnect(), "unexpected error: {}", err);
    }

    #[test]
    fn test_decode_error_names_request() {
        let err = decode::<SceneList>("GetSceneList", json!({"nope": 1})).unwrap_err();
        assert!(err.to_string().contains("GetSceneList"));
    }
}
