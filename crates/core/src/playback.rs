use crate::device::{AudioOutput, DeviceError, OutputSink};
use crate::state::SessionState;
use mentor_native_utils::audio::decode_f32;
use mentor_realtime_types::audio::{Base64EncodedAudioBytes, PLAYBACK_SAMPLE_RATE};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Serialised playback of inbound audio frames.
///
/// Frames are decoded only when they reach the head of the queue and each
/// one starts after the previous one reports completion. The output device
/// is opened on the first frame and released when the engine is dropped.
pub(crate) struct PlaybackEngine {
    tx: mpsc::UnboundedSender<Base64EncodedAudioBytes>,
    task: JoinHandle<()>,
}

impl PlaybackEngine {
    pub(crate) fn spawn(output: Arc<dyn AudioOutput>, state: SessionState) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Base64EncodedAudioBytes>();
        let mut player = Player {
            output,
            sink: None,
            output_failed: false,
            queue: VecDeque::new(),
            state,
        };

        let task = tokio::spawn(async move {
            let mut current: Option<oneshot::Receiver<()>> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = finished(&mut current) => {
                        current = player.start_next().await;
                    }
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        player.queue.push_back(frame);
                        if current.is_none() {
                            current = player.start_next().await;
                        }
                    }
                }
            }
            player.state.set_speaking(false);
            tracing::debug!("playback engine stopped");
        });
        Self { tx, task }
    }

    pub(crate) fn enqueue(&self, frame: Base64EncodedAudioBytes) {
        if self.tx.send(frame).is_err() {
            tracing::debug!("playback engine gone; dropping audio frame");
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn finished(current: &mut Option<oneshot::Receiver<()>>) {
    match current {
        // A sink that vanished mid-frame counts as done.
        Some(done) => {
            let _ = done.await;
        }
        None => std::future::pending().await,
    }
}

struct Player {
    output: Arc<dyn AudioOutput>,
    sink: Option<Box<dyn OutputSink>>,
    /// Set once opening the output has failed; later frames are discarded
    /// without another attempt.
    output_failed: bool,
    queue: VecDeque<Base64EncodedAudioBytes>,
    state: SessionState,
}

impl Player {
    /// Start the next playable frame, or report that the queue drained.
    async fn start_next(&mut self) -> Option<oneshot::Receiver<()>> {
        if self.output_failed {
            self.queue.clear();
        }
        while let Some(encoded) = self.queue.pop_front() {
            let samples = match decode_f32(&encoded) {
                Ok(samples) if !samples.is_empty() => samples,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("skipping undecodable audio frame: {:#}", e);
                    continue;
                }
            };

            if self.sink.is_none() {
                match open_sink(&*self.output).await {
                    Ok(sink) => self.sink = Some(sink),
                    Err(e) => {
                        tracing::error!("failed to open audio output: {}", e);
                        self.output_failed = true;
                        self.queue.clear();
                        break;
                    }
                }
            }

            if let Some(sink) = self.sink.as_mut() {
                self.state.set_speaking(true);
                return Some(sink.play(samples));
            }
        }
        self.state.set_speaking(false);
        None
    }
}

async fn open_sink(output: &dyn AudioOutput) -> Result<Box<dyn OutputSink>, DeviceError> {
    let sink = output.open(PLAYBACK_SAMPLE_RATE).await?;
    if sink.sample_rate() != PLAYBACK_SAMPLE_RATE {
        return Err(DeviceError::Backend(format!(
            "output path runs at {} Hz, expected {} Hz",
            sink.sample_rate(),
            PLAYBACK_SAMPLE_RATE
        )));
    }
    tracing::info!(sample_rate = PLAYBACK_SAMPLE_RATE, "audio output opened");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeOutput, PlaybackEvent, pcm_frame, wait_until};
    use std::sync::atomic::Ordering;

    fn engine(output: &Arc<FakeOutput>) -> (PlaybackEngine, SessionState) {
        let state = SessionState::new();
        (PlaybackEngine::spawn(output.clone(), state.clone()), state)
    }

    #[tokio::test]
    async fn frames_play_back_to_back_in_arrival_order() {
        let output = Arc::new(FakeOutput::new());
        let (engine, state) = engine(&output);

        for id in 1..=5 {
            engine.enqueue(pcm_frame(id * 100, 240));
        }
        wait_until("all frames to finish", || output.events().len() == 10).await;

        let expected: Vec<PlaybackEvent> = (1..=5)
            .flat_map(|id| [PlaybackEvent::Started(id * 100), PlaybackEvent::Finished(id * 100)])
            .collect();
        assert_eq!(output.events(), expected);
        assert!(!output.overlapped.load(Ordering::SeqCst));
        wait_until("speaking to stop", || !state.snapshot().is_speaking).await;
    }

    #[tokio::test]
    async fn output_is_opened_lazily_and_once() {
        let output = Arc::new(FakeOutput::new());
        let (engine, _state) = engine(&output);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(output.opened.load(Ordering::SeqCst), 0);

        engine.enqueue(pcm_frame(1, 48));
        engine.enqueue(pcm_frame(2, 48));
        wait_until("both frames to finish", || output.events().len() == 4).await;
        assert_eq!(output.opened.load(Ordering::SeqCst), 1);

        drop(engine);
        wait_until("output to be released", || output.live() == 0).await;
    }

    #[tokio::test]
    async fn speaking_tracks_the_queue() {
        let output = Arc::new(FakeOutput::new());
        let (engine, state) = engine(&output);
        let mut watch = state.subscribe();

        engine.enqueue(pcm_frame(7, 48));
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            watch.wait_for(|s| s.is_speaking),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            watch.wait_for(|s| !s.is_speaking),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(output.events().len(), 2);
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let output = Arc::new(FakeOutput::new());
        let (engine, _state) = engine(&output);

        engine.enqueue("not base64!".to_string());
        engine.enqueue(pcm_frame(3, 48));
        wait_until("the valid frame to finish", || output.events().len() == 2).await;
        assert_eq!(output.events()[0], PlaybackEvent::Started(3));
    }

    #[tokio::test]
    async fn wrong_rate_output_is_tried_once_and_never_plays() {
        let output = Arc::new(FakeOutput::at_rate(48_000));
        let (engine, state) = engine(&output);

        engine.enqueue(pcm_frame(1, 48));
        wait_until("the output to be tried", || {
            output.opened.load(Ordering::SeqCst) == 1
        })
        .await;
        for id in 2..=5 {
            engine.enqueue(pcm_frame(id, 48));
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(output.opened.load(Ordering::SeqCst), 1);
        assert!(output.events().is_empty());
        assert_eq!(output.live(), 0);
        assert!(!state.snapshot().is_speaking);
    }
}
