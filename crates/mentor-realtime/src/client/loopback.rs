use super::{Client, MessageSender, Outgoing, ServerEvent, ServerRx};
use crate::types::{ClientMessage, ServerMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// The far end of an in-memory channel built by [`loopback`].
pub struct Loopback {
    outgoing: mpsc::Receiver<ClientMessage>,
    events: mpsc::Sender<ServerEvent>,
    open: Arc<AtomicBool>,
}

/// Builds a [`Client`] whose channel is a pair of in-memory queues.
///
/// Everything the client sends shows up on [`Loopback::recv`], and
/// anything passed to [`Loopback::inject`] is delivered as if the service
/// had sent it.
pub fn loopback(capacity: usize) -> (Client, ServerRx, Loopback) {
    let (c_tx, mut c_rx) = mpsc::channel::<Outgoing>(capacity);
    let (remote_tx, remote_rx) = mpsc::channel(capacity);
    let (s_tx, s_rx) = mpsc::channel(capacity);
    let open = Arc::new(AtomicBool::new(true));

    let writer_open = open.clone();
    let writer = tokio::spawn(async move {
        while let Some(outgoing) = c_rx.recv().await {
            match outgoing {
                Outgoing::Message(message) => {
                    if remote_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Outgoing::Close => break,
            }
        }
        writer_open.store(false, Ordering::Release);
    });

    let client = Client::new(MessageSender::new(c_tx, open.clone()), writer, None);
    let remote = Loopback {
        outgoing: remote_rx,
        events: s_tx,
        open,
    };
    (client, s_rx, remote)
}

impl Loopback {
    /// Next message the client sent, or `None` once the client is gone and
    /// its queue is drained.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.outgoing.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.outgoing.try_recv().ok()
    }

    /// Deliver a message as if the service had sent it.
    pub async fn inject(&self, message: ServerMessage) -> bool {
        self.events.send(ServerEvent::Message(message)).await.is_ok()
    }

    /// Simulate the channel dropping out from under the client.
    pub async fn drop_connection(&self, reason: &str) {
        self.open.store(false, Ordering::Release);
        let _ = self
            .events
            .send(ServerEvent::Closed {
                reason: Some(reason.to_string()),
            })
            .await;
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
