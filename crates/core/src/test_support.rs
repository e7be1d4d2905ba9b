//! Counting fakes for the device and channel seams.

use crate::connector::Connector;
use crate::device::{AudioInput, AudioOutput, DeviceError, InputStream, OutputSink, SampleSink};
use crate::surface::Surface;
use async_trait::async_trait;
use image::RgbaImage;
use mentor_native_utils::audio::encode_i16;
use mentor_realtime::{Client, Loopback, ServerRx};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Base64 PCM16 frame whose every sample is `id`.
pub(crate) fn pcm_frame(id: i16, len: usize) -> String {
    encode_i16(&vec![id; len])
}

pub(crate) async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default)]
pub(crate) struct FakeInput {
    pub live: Arc<AtomicUsize>,
    pub opened: AtomicUsize,
    pub failure: Option<DeviceError>,
    sinks: Mutex<Vec<SampleSink>>,
}

impl FakeInput {
    pub(crate) fn failing(failure: DeviceError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Push samples through the most recently opened stream.
    pub(crate) fn push(&self, samples: Vec<f32>) -> bool {
        let sinks = self.sinks.lock().unwrap();
        sinks.last().is_some_and(|sink| sink.push(samples))
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct FakeInputStream {
    live: Arc<AtomicUsize>,
}

impl InputStream for FakeInputStream {
    fn sample_rate(&self) -> u32 {
        16_000
    }
}

impl Drop for FakeInputStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioInput for FakeInput {
    async fn open(&self, sink: SampleSink) -> Result<Box<dyn InputStream>, DeviceError> {
        if let Some(failure) = self.failure.clone() {
            return Err(failure);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().unwrap().push(sink);
        Ok(Box::new(FakeInputStream {
            live: self.live.clone(),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaybackEvent {
    Started(i16),
    Finished(i16),
}

pub(crate) struct FakeOutput {
    pub live: Arc<AtomicUsize>,
    pub opened: AtomicUsize,
    pub sample_rate: u32,
    pub frame_duration: Duration,
    pub events: Arc<Mutex<Vec<PlaybackEvent>>>,
    pub overlapped: Arc<AtomicBool>,
}

impl FakeOutput {
    pub(crate) fn new() -> Self {
        Self::at_rate(24_000)
    }

    pub(crate) fn at_rate(sample_rate: u32) -> Self {
        Self {
            live: Arc::default(),
            opened: AtomicUsize::new(0),
            sample_rate,
            frame_duration: Duration::from_millis(15),
            events: Arc::default(),
            overlapped: Arc::default(),
        }
    }

    pub(crate) fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct FakeSink {
    live: Arc<AtomicUsize>,
    sample_rate: u32,
    frame_duration: Duration,
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
    playing: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
}

impl OutputSink for FakeSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, samples: Vec<f32>) -> oneshot::Receiver<()> {
        let id = (samples[0] * 32768.0).round() as i16;
        if self.playing.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.events.lock().unwrap().push(PlaybackEvent::Started(id));

        let (done_tx, done_rx) = oneshot::channel();
        let events = self.events.clone();
        let playing = self.playing.clone();
        let duration = self.frame_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            playing.store(false, Ordering::SeqCst);
            events.lock().unwrap().push(PlaybackEvent::Finished(id));
            let _ = done_tx.send(());
        });
        done_rx
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn open(&self, _sample_rate: u32) -> Result<Box<dyn OutputSink>, DeviceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSink {
            live: self.live.clone(),
            sample_rate: self.sample_rate,
            frame_duration: self.frame_duration,
            events: self.events.clone(),
            playing: Arc::default(),
            overlapped: self.overlapped.clone(),
        }))
    }
}

#[derive(Default)]
pub(crate) struct CountingSurface {
    pub renders: AtomicUsize,
}

impl CountingSurface {
    pub(crate) fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl Surface for CountingSurface {
    fn render(&self, _exclude_tag: &str) -> anyhow::Result<RgbaImage> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(RgbaImage::new(16, 16))
    }
}

/// Hands out loopback channels and keeps their remote ends for the test.
#[derive(Default)]
pub(crate) struct LoopbackConnector {
    pub connects: AtomicUsize,
    pub refuse: bool,
    remotes: Mutex<Vec<Loopback>>,
}

impl LoopbackConnector {
    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Remote end of the most recent connection.
    pub(crate) fn take_remote(&self) -> Loopback {
        self.remotes.lock().unwrap().pop().expect("no connection was made")
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, _url: &str, capacity: usize) -> anyhow::Result<(Client, ServerRx)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            anyhow::bail!("connection refused");
        }
        let (client, events, remote) = mentor_realtime::loopback(capacity);
        self.remotes.lock().unwrap().push(remote);
        Ok((client, events))
    }
}
