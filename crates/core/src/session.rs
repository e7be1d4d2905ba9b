use crate::capture::CapturePipeline;
use crate::connector::Connector;
use crate::device::{AudioInput, AudioOutput, InputStream, SampleSink};
use crate::error::SessionError;
use crate::playback::PlaybackEngine;
use crate::scheduler::VisualScheduler;
use crate::session_config::{SessionConfig, SessionOptions};
use crate::state::{SessionSnapshot, SessionState, SessionStatus};
use crate::surface::Surface;
use mentor_realtime::{Client, ServerEvent, ServerRx};
use mentor_realtime_types::events::server::ErrorSeverity;
use mentor_realtime_types::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Raw input chunks buffered between the device callback and the capture
/// stage.
const RAW_CHUNK_CAPACITY: usize = 64;

/// What a session needs from its host.
#[derive(Clone)]
pub struct SessionDevices {
    pub input: Arc<dyn AudioInput>,
    pub output: Arc<dyn AudioOutput>,
    pub surface: Arc<dyn Surface>,
    pub connector: Arc<dyn Connector>,
}

/// Orchestrates one live mentoring session at a time.
///
/// `connect` acquires the microphone, opens the channel and sends the setup
/// message; the session turns `active` once the service reports ready.
/// Every resource acquired for a session is released by `disconnect`, by a
/// fatal error, or when the orchestrator is dropped.
pub struct MentorSession {
    devices: SessionDevices,
    options: SessionOptions,
    state: SessionState,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MentorSession {
    pub fn new(devices: SessionDevices) -> Self {
        Self::with_options(devices, SessionOptions::default())
    }

    pub fn with_options(devices: SessionDevices, options: SessionOptions) -> Self {
        Self {
            devices,
            options,
            state: SessionState::new(),
            active: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Start a session, tearing down any previous one first.
    pub async fn connect(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        self.disconnect().await;

        tracing::info!(
            endpoint = config.endpoint_url(),
            voice = config.voice_name(),
            context = config.context_source(),
            "starting mentor session"
        );
        self.state.begin();
        match self.start(&config).await {
            Ok(active) => {
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                tracing::error!("failed to start mentor session: {}", e);
                self.state.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn start(&self, config: &SessionConfig) -> Result<ActiveSession, SessionError> {
        let (sink, raw) = SampleSink::channel(RAW_CHUNK_CAPACITY);
        let input = self.devices.input.open(sink).await?;
        let input_rate = input.sample_rate();
        tracing::info!(sample_rate = input_rate, "audio input acquired");

        // On any early return below, `input` and `client` drop here and
        // release the microphone and the socket.
        let (client, events) = self
            .devices
            .connector
            .connect(config.endpoint_url(), self.options.channel_capacity)
            .await
            .map_err(|e| SessionError::Connection(format!("{e:#}")))?;

        client
            .send(config.setup_message().into())
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        tracing::debug!("setup message sent");

        let capture = CapturePipeline::spawn(
            raw,
            input_rate,
            client.sender(),
            self.state.clone(),
            self.options.level_tick,
        )
        .map_err(|e| SessionError::Device(format!("{e:#}")))?;
        let playback = PlaybackEngine::spawn(self.devices.output.clone(), self.state.clone());

        let driver = SessionDriver {
            state: self.state.clone(),
            options: self.options.clone(),
            surface: self.devices.surface.clone(),
            resources: Some(LiveResources {
                client,
                input,
                capture,
                playback,
                scheduler: None,
            }),
            warning: None,
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(driver.run(events, shutdown_rx));

        Ok(ActiveSession {
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Stop the current session and release everything it holds. Safe to
    /// call in any state, any number of times.
    pub async fn disconnect(&mut self) {
        let Some(mut active) = self.active.take() else {
            if self.state.status() != SessionStatus::Idle {
                self.state.reset_idle();
            }
            return;
        };

        tracing::info!("disconnecting mentor session");
        if let Some(shutdown) = active.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(self.options.teardown_timeout, &mut active.task)
            .await
            .is_err()
        {
            tracing::warn!("session teardown timed out; aborting");
            active.task.abort();
            let _ = (&mut active.task).await;
        }
        self.state.reset_idle();
    }
}

impl Drop for MentorSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

/// Everything acquired for one session, torn down together.
struct LiveResources {
    client: Client,
    input: Box<dyn InputStream>,
    capture: CapturePipeline,
    playback: PlaybackEngine,
    scheduler: Option<VisualScheduler>,
}

impl LiveResources {
    async fn release(self, send_end: bool) {
        let LiveResources {
            client,
            input,
            capture,
            playback,
            scheduler,
        } = self;
        // Producers stop before the channel closes.
        drop(scheduler);
        drop(capture);
        drop(input);
        drop(playback);

        if send_end && client.is_open() {
            if let Err(e) = client.send(ClientMessage::end()).await {
                tracing::debug!("could not send end message: {}", e);
            }
        }
        client.shutdown().await;
        tracing::debug!("session resources released");
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Task that owns a live session and reacts to the service.
struct SessionDriver {
    state: SessionState,
    options: SessionOptions,
    surface: Arc<dyn Surface>,
    resources: Option<LiveResources>,
    warning: Option<(String, Instant)>,
}

impl SessionDriver {
    async fn run(mut self, mut events: ServerRx, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let warning_deadline = self.warning.as_ref().map(|(_, at)| *at);
            tokio::select! {
                _ = &mut shutdown => {
                    self.stop(true).await;
                    return;
                }
                event = events.recv() => {
                    let event = event.unwrap_or(ServerEvent::Closed { reason: None });
                    if let Flow::Stop = self.dispatch(event) {
                        self.stop(false).await;
                        return;
                    }
                }
                _ = tokio::time::sleep_until(warning_deadline.unwrap_or_else(Instant::now)),
                    if warning_deadline.is_some() => {
                    if let Some((message, _)) = self.warning.take() {
                        self.state.clear_warning(&message);
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent) -> Flow {
        let message = match event {
            ServerEvent::Message(message) => message,
            ServerEvent::Closed { reason } => {
                let error =
                    SessionError::ChannelLost(reason.unwrap_or_else(|| "channel closed".to_string()));
                tracing::error!("{}", error);
                self.state.fail(error.to_string());
                return Flow::Stop;
            }
        };

        match message {
            ServerMessage::Ready => self.on_ready(),
            ServerMessage::Audio(audio) => {
                if let Some(resources) = &self.resources {
                    resources.playback.enqueue(audio.into_data());
                }
            }
            ServerMessage::Transcript(transcript) => {
                self.state.append_transcript(transcript.text());
            }
            ServerMessage::TurnComplete => tracing::debug!("mentor turn complete"),
            ServerMessage::Error(error) => match error.severity() {
                ErrorSeverity::Warning => {
                    tracing::warn!("mentoring service warning: {}", error.message());
                    let message = error.message().to_string();
                    self.state.set_warning(message.clone());
                    self.warning = Some((message, Instant::now() + self.options.warning_ttl));
                }
                ErrorSeverity::Fatal => {
                    let error = SessionError::Service(error.message().to_string());
                    tracing::error!("{}", error);
                    self.state.fail(error.to_string());
                    return Flow::Stop;
                }
            },
        }
        Flow::Continue
    }

    fn on_ready(&mut self) {
        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        tracing::info!("mentor session is ready");
        self.state.set_status(SessionStatus::Active);
        if resources.scheduler.is_none() {
            resources.scheduler = Some(VisualScheduler::spawn(
                self.surface.clone(),
                resources.client.sender(),
                self.options.screenshot_interval,
            ));
        }
        self.state.set_capturing(true);
    }

    async fn stop(&mut self, send_end: bool) {
        self.warning = None;
        if let Some(resources) = self.resources.take() {
            resources.release(send_end).await;
        }
        self.state.clear_activity();
    }
}
