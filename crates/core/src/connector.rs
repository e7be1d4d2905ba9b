use async_trait::async_trait;
use mentor_realtime::{Client, Config, ServerRx};
use std::time::Duration;

/// Opens the duplex channel for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, capacity: usize) -> anyhow::Result<(Client, ServerRx)>;
}

/// Connects over WebSocket.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str, capacity: usize) -> anyhow::Result<(Client, ServerRx)> {
        let mut builder = Config::builder(url).with_capacity(capacity);
        if let Some(timeout) = self.connect_timeout {
            builder = builder.with_connect_timeout(timeout);
        }
        mentor_realtime::connect_with_config(builder.build()).await
    }
}
