use std::time::Duration;

use crate::client::consts::{DEFAULT_CAPACITY, DEFAULT_CONNECT_TIMEOUT};

#[derive(Debug, Clone)]
pub struct Config {
    url: String,
    capacity: usize,
    connect_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            config: Config::new(url),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.config.url = url.to_string();
        self
    }

    /// Bound of both the outgoing queue and the inbound event queue.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Config {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            capacity: DEFAULT_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn builder(url: &str) -> ConfigBuilder {
        ConfigBuilder::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}
