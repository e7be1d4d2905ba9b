use crate::config::{OUTPUT_BUFFER_SECONDS, OUTPUT_CHUNK_SIZE};
use crate::cpal_input::classify;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use mentor_core::{AudioOutput, DeviceError, OutputSink};
use mentor_native_utils::audio::create_resampler;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::{FastFixedIn, Resampler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Chunk size fed to the playback resampler.
const RESAMPLE_CHUNK_SIZE: usize = 100;
/// How long the feeder waits for the device to drain the ring.
const FEED_BACKOFF: Duration = Duration::from_millis(5);
/// Slack past the expected drain time before a frame is reported done anyway.
const DRAIN_GRACE: Duration = Duration::from_secs(1);
/// Idle time after which a partial resampler chunk is flushed to the device.
const CARRY_FLUSH_AFTER: Duration = Duration::from_millis(50);

/// Speaker playback through cpal.
///
/// The stream runs on its own thread, which also feeds the ring buffer and
/// resamples when the device cannot run at the source rate.
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

struct PlayJob {
    samples: Vec<f32>,
    done: oneshot::Sender<()>,
}

struct CpalOutputSink {
    sample_rate: u32,
    jobs: mpsc::Sender<PlayJob>,
    stop: Arc<AtomicBool>,
}

impl Drop for CpalOutputSink {
    fn drop(&mut self) {
        // Cuts off the frame in flight; the thread drops the stream next.
        self.stop.store(true, Ordering::Release);
    }
}

impl OutputSink for CpalOutputSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, samples: Vec<f32>) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        if self.jobs.send(PlayJob { samples, done }).is_err() {
            tracing::warn!("output thread is gone; dropping audio frame");
        }
        rx
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputSink>, DeviceError> {
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (jobs_tx, jobs_rx) = mpsc::channel::<PlayJob>();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        std::thread::Builder::new()
            .name("mentor-output".to_string())
            .spawn(move || match OutputThread::start(device_name.as_deref(), sample_rate, thread_stop) {
                Ok(thread) => {
                    let _ = ready_tx.send(Ok(()));
                    thread.run(jobs_rx);
                    tracing::info!("audio output released");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Backend(format!("failed to spawn output thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| DeviceError::Backend("output thread exited early".to_string()))??;
        Ok(Box::new(CpalOutputSink {
            sample_rate,
            jobs: jobs_tx,
            stop,
        }))
    }
}

/// Owns the cpal stream and whatever feeds it.
struct OutputThread {
    _stream: cpal::Stream,
    feeder: Feeder,
}

impl OutputThread {
    fn start(
        device_name: Option<&str>,
        source_rate: u32,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, DeviceError> {
        let output = mentor_native_utils::device::find_output(device_name)
            .map_err(|e| DeviceError::Backend(format!("{e:#}")))?
            .ok_or(DeviceError::NotFound)?;
        tracing::info!("Using output device: {:?}", output.name());

        // Run the device at the source rate when it can, otherwise convert.
        let (supported, resampler) = match mentor_native_utils::device::output_config_at(&output, source_rate) {
            Some(supported) => (supported, None),
            None => {
                let supported = output.default_output_config().map_err(|e| match e {
                    cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::NotFound,
                    other => classify(other),
                })?;
                let resampler = create_resampler(
                    source_rate as f64,
                    supported.sample_rate().0 as f64,
                    RESAMPLE_CHUNK_SIZE,
                )
                .map_err(|e| DeviceError::Backend(format!("{e:#}")))?;
                (supported, Some(resampler))
            }
        };

        let output_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
        };
        let channel_count = (output_config.channels as usize).max(1);
        tracing::info!(
            resampling = resampler.is_some(),
            "Output stream config: {:?}",
            &output_config
        );

        let ring = HeapRb::<f32>::new(output_config.sample_rate.0 as usize * OUTPUT_BUFFER_SECONDS);
        let (producer, mut consumer) = ring.split();
        let consumed = Arc::new(AtomicU64::new(0));
        let played = consumed.clone();

        // Every channel of a device frame gets the same mono sample; silence
        // fills the gaps between frames.
        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut taken = 0u64;
            for frame in data.chunks_mut(channel_count) {
                let sample = match consumer.try_pop() {
                    Some(sample) => {
                        taken += 1;
                        sample
                    }
                    None => 0.0,
                };
                frame.fill(sample);
            }
            if taken > 0 {
                played.fetch_add(taken, Ordering::Release);
            }
        };

        let stream = output
            .build_output_stream(
                &output_config,
                output_data_fn,
                move |err| tracing::error!("An error occurred on output stream: {}", err),
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NotFound,
                other => classify(other),
            })?;
        stream.play().map_err(classify)?;

        Ok(Self {
            _stream: stream,
            feeder: Feeder::new(
                producer,
                resampler,
                consumed,
                output_config.sample_rate.0,
                stop,
            ),
        })
    }

    fn run(mut self, jobs: mpsc::Receiver<PlayJob>) {
        let feeder = &mut self.feeder;
        while !feeder.stopped() {
            match jobs.recv_timeout(CARRY_FLUSH_AFTER) {
                Ok(job) => {
                    feeder.play(job.samples);
                    if feeder.stopped() {
                        break;
                    }
                    let _ = job.done.send(());
                }
                // Nothing follows the last frame; let its tail out.
                Err(RecvTimeoutError::Timeout) => feeder.flush(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

/// Converts frames to the device rate, pushes them into the ring and tracks
/// how much of it the device callback has consumed.
struct Feeder {
    producer: ringbuf::HeapProd<f32>,
    resampler: Option<FastFixedIn<f32>>,
    /// Source samples short of a full resampler chunk, carried into the
    /// next frame so frame edges are not padded with silence.
    carry: Vec<f32>,
    consumed: Arc<AtomicU64>,
    pushed: u64,
    device_rate: u32,
    stop: Arc<AtomicBool>,
}

impl Feeder {
    fn new(
        producer: ringbuf::HeapProd<f32>,
        resampler: Option<FastFixedIn<f32>>,
        consumed: Arc<AtomicU64>,
        device_rate: u32,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            producer,
            resampler,
            carry: Vec::with_capacity(RESAMPLE_CHUNK_SIZE),
            consumed,
            pushed: 0,
            device_rate,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Push one frame and block until the device has played it.
    fn play(&mut self, samples: Vec<f32>) {
        let converted = self.convert(samples);
        self.feed(&converted);
        self.wait_drained();
    }

    /// Resample whatever is carried, zero-padding it to a full chunk.
    fn flush(&mut self) {
        if self.carry.is_empty() {
            return;
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        let tail = std::mem::take(&mut self.carry);
        match resampler.process_partial(Some(&[tail.as_slice()][..]), None) {
            Ok(resampled) => {
                if let Some(channel) = resampled.first() {
                    self.feed(channel);
                }
            }
            Err(e) => tracing::warn!("Failed to resample output audio: {}", e),
        }
    }

    /// Block until the device has consumed the last pushed sample. A stalled
    /// stream gives up after the expected drain time plus [`DRAIN_GRACE`].
    fn wait_drained(&mut self) {
        let pending = self.pushed.saturating_sub(self.consumed.load(Ordering::Acquire));
        let expected = Duration::from_secs_f64(pending as f64 / self.device_rate.max(1) as f64);
        let deadline = Instant::now() + expected + DRAIN_GRACE;
        while self.consumed.load(Ordering::Acquire) < self.pushed {
            if self.stopped() {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!("output stream stalled; abandoning frame");
                self.pushed = self.consumed.load(Ordering::Acquire);
                return;
            }
            std::thread::sleep(FEED_BACKOFF);
        }
    }

    fn convert(&mut self, samples: Vec<f32>) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples;
        };
        self.carry.extend(samples);
        let mut converted = Vec::with_capacity(self.carry.len() * 2);
        let mut start = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.carry.len() - start < needed {
                break;
            }
            match resampler.process(&[&self.carry[start..start + needed]], None) {
                Ok(resampled) => {
                    if let Some(channel) = resampled.first() {
                        converted.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::warn!("Failed to resample output audio: {}", e),
            }
            start += needed;
        }
        self.carry.drain(..start);
        converted
    }

    fn feed(&mut self, samples: &[f32]) {
        let mut offset = 0;
        let mut stalled_since: Option<Instant> = None;
        while offset < samples.len() {
            if self.stopped() {
                return;
            }
            let written = self.producer.push_slice(&samples[offset..]);
            offset += written;
            self.pushed += written as u64;
            if written > 0 {
                stalled_since = None;
                continue;
            }
            let since = *stalled_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= DRAIN_GRACE {
                tracing::warn!("output ring is not draining; dropping {} samples", samples.len() - offset);
                return;
            }
            std::thread::sleep(FEED_BACKOFF);
        }
    }
}
