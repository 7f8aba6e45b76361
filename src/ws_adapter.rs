use crate::consultation::OutboundSink;
use crate::error::TransportError;
use crate::protocol;
use crate::types::OutboundMessage;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection callbacks, delivered in the order the socket produced them.
/// `Closed` marks a clean shutdown; a receive `Error` is not followed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    Binary(Vec<u8>),
    Error(String),
    Closed,
}

/// Connect-time retry. An established connection is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::from_millis(500),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Queues frames for the writer task; sending never waits on the socket.
#[derive(Debug, Clone)]
pub struct WsSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl OutboundSink for WsSink {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let json = protocol::encode_outbound(message)?;
        self.tx
            .send(Message::text(json))
            .map_err(|_| TransportError::Closed)
    }
}

pub struct WsAdapter {
    sink: WsSink,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl WsAdapter {
    pub async fn connect(url: &Url, retry: RetryPolicy) -> Result<Self, TransportError> {
        let ws_stream = connect_with_retry(url, retry).await?;
        info!(url = %url, "ws: connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (event_tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        let _ = event_tx.send(TransportEvent::Opened);

        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(err) = ws_tx.send(frame).await {
                    warn!(error = %err, "ws: send failed");
                    let _ = writer_events.send(TransportEvent::Error(err.to_string()));
                    break;
                }
            }
            let _ = ws_tx.close().await;
            debug!("ws: writer stopped");
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => TransportEvent::Text(text.to_string()),
                    Ok(Message::Binary(bin)) => TransportEvent::Binary(bin.to_vec()),
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "ws: close frame received");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                        continue;
                    }
                    Err(err) => {
                        // No Closed follows: the session stays open but stalled.
                        warn!(error = %err, "ws: receive failed");
                        let _ = event_tx.send(TransportEvent::Error(err.to_string()));
                        debug!("ws: reader stopped after error");
                        return;
                    }
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed);
            debug!("ws: reader stopped");
        });

        Ok(WsAdapter {
            sink: WsSink { tx: out_tx },
            rx,
        })
    }

    pub fn sink(&self) -> WsSink {
        self.sink.clone()
    }

    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<TransportEvent> {
        &mut self.rx
    }
}

async fn connect_with_retry(url: &Url, retry: RetryPolicy) -> Result<WsStream, TransportError> {
    let mut attempt = 0;
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => return Ok(stream),
            Err(err) if attempt < retry.retries => {
                let delay = retry.delay(attempt);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "ws: connect failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(TransportError::Connect {
                    url: url.to_string(),
                    source: Box::new(err),
                });
            }
        }
    }
}
