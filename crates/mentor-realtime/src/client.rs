use crate::types::{ClientMessage, ServerMessage};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

mod config;
mod consts;
mod loopback;

pub use config::{Config, ConfigBuilder};
pub use loopback::{Loopback, loopback};

type ServerTx = mpsc::Sender<ServerEvent>;
pub type ServerRx = mpsc::Receiver<ServerEvent>;

/// What the reader task reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(ServerMessage),
    /// The channel is gone. Reported once, whatever the cause.
    Closed { reason: Option<String> },
}

/// Items on the writer queue.
#[derive(Debug)]
enum Outgoing {
    Message(ClientMessage),
    Close,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("channel is not open")]
    NotOpen,
    #[error("outgoing queue is full")]
    Full,
    #[error("channel writer has shut down")]
    Closed,
}

/// Cloneable handle for queueing messages onto the channel.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl MessageSender {
    fn new(tx: mpsc::Sender<Outgoing>, open: Arc<AtomicBool>) -> Self {
        Self { tx, open }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queue a message, waiting for room on the writer queue.
    pub async fn send(&self, message: ClientMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        self.tx
            .send(Outgoing::Message(message))
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Queue a message without waiting. Used on the capture paths, where a
    /// frame that cannot be sent right now has no value later.
    pub fn try_send(&self, message: ClientMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        self.tx
            .try_send(Outgoing::Message(message))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }
}

/// Owns the duplex channel to the mentoring service.
///
/// Dropping the client aborts its reader and writer tasks, which releases
/// the socket.
pub struct Client {
    sender: MessageSender,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Client {
    fn new(sender: MessageSender, writer: JoinHandle<()>, reader: Option<JoinHandle<()>>) -> Self {
        Self {
            sender,
            writer: Some(writer),
            reader,
        }
    }

    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_open()
    }

    pub async fn send(&self, message: ClientMessage) -> Result<(), SendError> {
        self.sender.send(message).await
    }

    /// Flush whatever is queued, close the socket and stop both tasks.
    pub async fn shutdown(mut self) {
        self.sender.open.store(false, Ordering::Release);
        let flush = async {
            if self.sender.tx.send(Outgoing::Close).await.is_ok() {
                if let Some(writer) = self.writer.as_mut() {
                    let _ = writer.await;
                }
            }
        };
        if tokio::time::timeout(consts::CLOSE_FLUSH_TIMEOUT, flush)
            .await
            .is_err()
        {
            tracing::warn!("channel writer did not flush in time; dropping queued messages");
        }
        tracing::debug!("channel shut down");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.sender.open.store(false, Ordering::Release);
        for task in [self.writer.take(), self.reader.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

fn describe_close(frame: Option<CloseFrame<'_>>) -> Option<String> {
    frame.map(|f| {
        if f.reason.is_empty() {
            format!("code {}", f.code)
        } else {
            format!("{} (code {})", f.reason, f.code)
        }
    })
}

fn decode_server_message(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            // Log the tag if there is one, not the payload, which may be megabytes of audio.
            let kind = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|json| json.get("type").and_then(|v| v.as_str()).map(str::to_owned));
            tracing::error!(
                "failed to deserialize server message: {}, type={}",
                e,
                kind.as_deref().unwrap_or("unknown")
            );
            None
        }
    }
}

/// Connect with default settings.
pub async fn connect(url: &str) -> Result<(Client, ServerRx)> {
    connect_with_config(Config::new(url)).await
}

pub async fn connect_with_config(config: Config) -> Result<(Client, ServerRx)> {
    // Get a WebSocket stream object, bounded by the handshake timeout.
    let (ws_stream, _) = tokio::time::timeout(
        config.connect_timeout(),
        tokio_tungstenite::connect_async(config.url()),
    )
    .await
    .context("Timed out connecting to mentor WebSocket")?
    .context("Failed to connect to mentor WebSocket")?;
    tracing::info!("Connected to mentor WebSocket.");

    let (mut write, mut read) = ws_stream.split();

    let (c_tx, mut c_rx) = mpsc::channel::<Outgoing>(config.capacity());
    let (s_tx, s_rx): (ServerTx, ServerRx) = mpsc::channel(config.capacity());
    let open = Arc::new(AtomicBool::new(true));

    let writer_open = open.clone();
    let writer = tokio::spawn(async move {
        while let Some(outgoing) = c_rx.recv().await {
            match outgoing {
                Outgoing::Message(message) => match serde_json::to_string(&message) {
                    Ok(text) => {
                        tracing::trace!("sending {} message", message.kind());
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize {} message: {}", message.kind(), e);
                    }
                },
                Outgoing::Close => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!("failed to send close frame: {}", e);
                    }
                    break;
                }
            }
        }
        writer_open.store(false, Ordering::Release);
    });

    let reader_open = open.clone();
    let reader = tokio::spawn(async move {
        let mut reason = None;
        while let Some(message) = read.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!("failed to read message: {}", e);
                    reason = Some(e.to_string());
                    break;
                }
            };
            let decoded = match message {
                Message::Text(text) => decode_server_message(&text),
                // Some gateways deliver JSON in binary frames.
                Message::Binary(bin) => match std::str::from_utf8(&bin) {
                    Ok(text) => decode_server_message(text),
                    Err(_) => {
                        tracing::warn!("unexpected non-text binary message ({} bytes)", bin.len());
                        None
                    }
                },
                Message::Close(frame) => {
                    reason = describe_close(frame);
                    tracing::info!("connection closed: {:?}", reason);
                    break;
                }
                _ => None,
            };
            if let Some(message) = decoded {
                tracing::debug!("received message: {}", message.kind());
                if s_tx.send(ServerEvent::Message(message)).await.is_err() {
                    // Nobody is listening any more.
                    break;
                }
            }
        }
        reader_open.store(false, Ordering::Release);
        let _ = s_tx.send(ServerEvent::Closed { reason }).await;
    });

    let sender = MessageSender::new(c_tx, open);
    Ok((Client::new(sender, writer, Some(reader)), s_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SetupMessage, TranscriptEvent};
    use tokio::net::TcpListener;

    async fn local_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (url, listener)
    }

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let (url, listener) = local_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let setup: ClientMessage = serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(setup.kind(), "setup");

            ws.send(Message::Text(r#"{"type":"ready"}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"transcript","text":"Hi"}"#.to_string()))
                .await
                .unwrap();

            let second = ws.next().await.unwrap().unwrap();
            let end: ClientMessage = serde_json::from_str(second.to_text().unwrap()).unwrap();
            assert_eq!(end, ClientMessage::end());
        });

        let (client, mut events) = connect(&url).await.unwrap();
        client
            .send(SetupMessage::new("general", "Puck").into())
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::Message(ServerMessage::Ready)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::Message(ServerMessage::Transcript(TranscriptEvent::new("Hi")))
        );

        client.send(ClientMessage::end()).await.unwrap();
        client.shutdown().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn remote_close_is_reported_once_and_closes_sender() {
        let (url, listener) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Garbage must be skipped, not treated as fatal.
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let (client, mut events) = connect(&url).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            ServerEvent::Closed { .. }
        ));
        assert!(events.recv().await.is_none());
        assert!(!client.is_open());
        assert_eq!(
            client.sender().try_send(ClientMessage::end()),
            Err(SendError::NotOpen)
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_connect() {
        let (url, listener) = local_server().await;
        drop(listener);
        assert!(connect(&url).await.is_err());
    }
}
