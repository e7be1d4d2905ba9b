use crate::config::INPUT_CHUNK_SIZE;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use mentor_core::{AudioInput, DeviceError, InputStream, SampleSink};
use mentor_native_utils::audio::downmix_to_mono;
use std::sync::mpsc;
use tokio::sync::oneshot;

/// Microphone capture through cpal.
///
/// cpal streams are not `Send`, so each opened stream lives on its own
/// thread until the returned handle is dropped.
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    device_name: Option<String>,
}

impl CpalInput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

struct CpalInputStream {
    sample_rate: u32,
    // Dropping this ends the stream thread.
    _stop: mpsc::Sender<()>,
}

impl InputStream for CpalInputStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    async fn open(&self, sink: SampleSink) -> Result<Box<dyn InputStream>, DeviceError> {
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("mentor-input".to_string())
            .spawn(move || match build_input_stream(device_name.as_deref(), sink) {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    // Blocks until the handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                    tracing::info!("audio input released");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Backend(format!("failed to spawn input thread: {e}")))?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| DeviceError::Backend("input thread exited early".to_string()))??;
        Ok(Box::new(CpalInputStream {
            sample_rate,
            _stop: stop_tx,
        }))
    }
}

fn build_input_stream(
    device_name: Option<&str>,
    sink: SampleSink,
) -> Result<(cpal::Stream, u32), DeviceError> {
    let input = mentor_native_utils::device::find_input(device_name)
        .map_err(|e| DeviceError::Backend(format!("{e:#}")))?
        .ok_or(DeviceError::NotFound)?;
    tracing::info!("Using input device: {:?}", input.name());

    let default_config = input.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::NotFound,
        other => classify(other),
    })?;

    // Default channels and sample rate, with a fixed buffer size.
    let input_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let channel_count = input_config.channels as usize;
    tracing::info!("Input stream config: {:?}", &input_config);

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if !sink.push(downmix_to_mono(data, channel_count)) {
            tracing::trace!("capture stage is behind; input chunk dropped");
        }
    };

    let stream = input
        .build_input_stream(
            &input_config,
            input_data_fn,
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NotFound,
            other => classify(other),
        })?;
    stream.play().map_err(classify)?;
    Ok((stream, input_config.sample_rate.0))
}

/// Maps a backend failure onto the device error taxonomy. Platforms report
/// a refused consent prompt only through the error text.
pub(crate) fn classify(err: impl std::fmt::Display) -> DeviceError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if ["permission", "denied", "not authorized", "not allowed"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        DeviceError::PermissionDenied(message)
    } else {
        DeviceError::Backend(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_failures_are_permission_errors() {
        assert!(matches!(
            classify("Access denied by the system"),
            DeviceError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify("Microphone use is not authorized for this app"),
            DeviceError::PermissionDenied(_)
        ));
    }

    #[test]
    fn other_failures_are_backend_errors() {
        assert_eq!(
            classify("buffer size unsupported"),
            DeviceError::Backend("buffer size unsupported".to_string())
        );
    }
}
