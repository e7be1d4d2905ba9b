//! Session orchestration for real-time voice mentoring.
//!
//! A [`MentorSession`] streams microphone audio and periodic stills of the
//! host surface to the mentoring service, plays back the mentor's voice, and
//! publishes a [`SessionSnapshot`] that hosts observe through a
//! `watch::Receiver`.

mod capture;
pub mod connector;
pub mod device;
pub mod error;
mod playback;
mod scheduler;
pub mod session;
pub mod session_config;
mod state;
pub mod surface;
pub mod visual;

#[cfg(test)]
mod test_support;

pub use capture::{AudioFrame, FrameAccumulator, LevelMeter};
pub use connector::{Connector, WebSocketConnector};
pub use device::{AudioInput, AudioOutput, DeviceError, InputStream, OutputSink, SampleSink};
pub use error::SessionError;
pub use session::{MentorSession, SessionDevices};
pub use session_config::{SessionConfig, SessionOptions, VoiceOption};
pub use state::{SessionSnapshot, SessionStatus};
pub use surface::{SESSION_OVERLAY_TAG, Surface};
