//! Seams between the session machinery and real audio hardware.
//!
//! Implementations live with the host (see the `mentor-service` cpal
//! adapters); the session only sees these traits.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The platform refused access, usually pending or denied user consent.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// No device matching the request exists.
    #[error("device not found")]
    NotFound,
    #[error("{0}")]
    Backend(String),
}

/// Non-blocking hand-off from an input device callback into the capture
/// stage. Each push moves one owned chunk of mono samples across; nothing
/// is shared.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::Sender<Vec<f32>>,
}

impl SampleSink {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<f32>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Never blocks. Returns `false` when the chunk was dropped because the
    /// capture stage is behind or gone.
    pub fn push(&self, mono: Vec<f32>) -> bool {
        self.tx.try_send(mono).is_ok()
    }
}

/// A live input device. Dropping it releases the device.
pub trait InputStream: Send {
    /// Rate of the samples pushed into the [`SampleSink`].
    fn sample_rate(&self) -> u32;
}

#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Acquire the device and start pushing mono chunks into `sink`.
    /// May wait on a permission prompt.
    async fn open(&self, sink: SampleSink) -> Result<Box<dyn InputStream>, DeviceError>;
}

/// A live output path. Dropping it releases the device.
pub trait OutputSink: Send {
    /// Rate `play` expects its samples at.
    fn sample_rate(&self) -> u32;

    /// Start rendering `samples`. The receiver resolves once the last
    /// sample has been rendered (or errors if the sink goes away first).
    fn play(&mut self, samples: Vec<f32>) -> oneshot::Receiver<()>;
}

#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputSink>, DeviceError>;
}
