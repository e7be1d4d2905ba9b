//! Audio capture pipeline.
//!
//! The input device pushes owned chunks of mono samples at its native rate
//! into a bounded queue. A dedicated stage task drains that queue,
//! resamples to 16 kHz, cuts fixed 4000-sample PCM16 frames and hands each
//! finished frame to the channel without waiting. The same stage keeps a
//! short analysis window for the `audio_level` meter.

use crate::state::SessionState;
use mentor_native_utils::audio::{create_resampler, encode_i16, f32_to_i16};
use mentor_realtime::{MessageSender, SendError};
use mentor_realtime_types::ClientMessage;
use mentor_realtime_types::audio::{
    Base64EncodedAudioBytes, CAPTURE_FRAME_SAMPLES, CAPTURE_SAMPLE_RATE,
};
use rubato::{FastFixedIn, Resampler};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Input chunk size fed to the resampler.
const RESAMPLE_CHUNK_SIZE: usize = 1024;

/// FFT size of the level meter.
pub const ANALYSIS_WINDOW: usize = 256;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Exactly [`CAPTURE_FRAME_SAMPLES`] samples of PCM16 at 16 kHz.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn encode(&self) -> Base64EncodedAudioBytes {
        encode_i16(&self.samples)
    }
}

/// Collects a continuous 16 kHz stream and cuts it into whole frames.
/// A partial frame stays pending; it is never emitted.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    pending: Vec<i16>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(CAPTURE_FRAME_SAMPLES),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        for &sample in samples {
            self.pending.push(f32_to_i16(sample));
            if self.pending.len() == CAPTURE_FRAME_SAMPLES {
                let samples = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(CAPTURE_FRAME_SAMPLES),
                );
                frames.push(AudioFrame { samples });
            }
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Spectral loudness estimate over the most recent [`ANALYSIS_WINDOW`]
/// samples, in `[0, 1]`.
pub struct LevelMeter {
    window: VecDeque<f32>,
    hann: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl LevelMeter {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let n = ANALYSIS_WINDOW as f32;
        let hann = (0..ANALYSIS_WINDOW)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1.0)).cos())
            .collect();
        Self {
            window: VecDeque::with_capacity(ANALYSIS_WINDOW),
            hann,
            fft: planner.plan_fft_forward(ANALYSIS_WINDOW),
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(ANALYSIS_WINDOW);
        for &sample in &samples[skip..] {
            if self.window.len() == ANALYSIS_WINDOW {
                self.window.pop_front();
            }
            self.window.push_back(sample);
        }
    }

    /// Mean of the per-bin magnitudes, each mapped from
    /// [-100 dB, -30 dB] onto [0, 1].
    pub fn level(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut buffer: Vec<Complex<f32>> = self
            .window
            .iter()
            .zip(&self.hann)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        buffer.resize(ANALYSIS_WINDOW, Complex::new(0.0, 0.0));
        self.fft.process(&mut buffer);

        let bins = ANALYSIS_WINDOW / 2;
        let total: f32 = buffer[..bins]
            .iter()
            .map(|bin| {
                let magnitude = bin.norm() / ANALYSIS_WINDOW as f32;
                if magnitude <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * magnitude.log10();
                ((db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0)
            })
            .sum();
        (total / bins as f32).clamp(0.0, 1.0)
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the stage task owns.
struct CaptureStage {
    resampler: Option<FastFixedIn<f32>>,
    backlog: VecDeque<f32>,
    accumulator: FrameAccumulator,
    meter: LevelMeter,
}

impl CaptureStage {
    fn new(input_rate: u32) -> anyhow::Result<Self> {
        let resampler = if input_rate == CAPTURE_SAMPLE_RATE {
            None
        } else {
            Some(create_resampler(
                input_rate as f64,
                CAPTURE_SAMPLE_RATE as f64,
                RESAMPLE_CHUNK_SIZE,
            )?)
        };
        Ok(Self {
            resampler,
            backlog: VecDeque::with_capacity(RESAMPLE_CHUNK_SIZE * 2),
            accumulator: FrameAccumulator::new(),
            meter: LevelMeter::new(),
        })
    }

    fn resample(&mut self, chunk: Vec<f32>) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return chunk;
        };
        self.backlog.extend(chunk);
        let mut resampled = Vec::new();
        while self.backlog.len() >= resampler.input_frames_next() {
            let input: Vec<f32> = self.backlog.drain(..resampler.input_frames_next()).collect();
            match resampler.process(&[input.as_slice()], None) {
                Ok(out) => {
                    if let Some(channel) = out.first() {
                        resampled.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::warn!("failed to resample input audio: {}", e),
            }
        }
        resampled
    }

    fn process(&mut self, chunk: Vec<f32>) -> Vec<AudioFrame> {
        let samples = self.resample(chunk);
        self.meter.push(&samples);
        self.accumulator.push(&samples)
    }
}

/// Handle to the running capture stage. Dropping it stops the stage.
pub(crate) struct CapturePipeline {
    task: JoinHandle<()>,
}

impl CapturePipeline {
    pub(crate) fn spawn(
        mut raw: mpsc::Receiver<Vec<f32>>,
        input_rate: u32,
        sender: MessageSender,
        state: SessionState,
        level_tick: Duration,
    ) -> anyhow::Result<Self> {
        let mut stage = CaptureStage::new(input_rate)?;
        tracing::debug!(input_rate, "starting audio capture stage");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(level_tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut dropped = 0usize;
            loop {
                tokio::select! {
                    chunk = raw.recv() => {
                        let Some(chunk) = chunk else { break };
                        for frame in stage.process(chunk) {
                            match sender.try_send(ClientMessage::audio(frame.encode())) {
                                Ok(()) => {}
                                Err(SendError::NotOpen) => dropped += 1,
                                Err(e) => {
                                    dropped += 1;
                                    tracing::debug!("dropping audio frame: {}", e);
                                }
                            }
                        }
                    }
                    _ = ticker.tick() => state.set_audio_level(stage.meter.level()),
                }
            }
            if dropped > 0 {
                tracing::debug!(dropped, "audio frames dropped while the channel was unavailable");
            }
            state.set_audio_level(0.0);
            tracing::debug!("audio capture stage stopped");
        });
        Ok(Self { task })
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.task.abort();
    }
}
