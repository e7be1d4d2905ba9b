mod config;
mod cpal_input;
mod cpal_output;
mod surface;

use crate::config::Config;
use crate::cpal_input::CpalInput;
use crate::cpal_output::CpalOutput;
use crate::surface::{BlankSurface, FileSurface};
use anyhow::{Context, Result};
use clap::Parser;
use mentor_core::{
    MentorSession, SessionConfig, SessionDevices, SessionStatus, Surface, WebSocketConnector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice mentoring session from the terminal")]
struct Cli {
    /// WebSocket URL of the mentoring service (falls back to MENTOR_ENDPOINT_URL)
    endpoint: Option<String>,
    /// What the student wants to get out of the session
    #[arg(long)]
    goal: Option<String>,
    /// Context source identifier
    #[arg(long)]
    context: Option<String>,
    /// Mentor voice id
    #[arg(long)]
    voice: Option<String>,
    /// Note carried over from an earlier session; may be repeated
    #[arg(long = "memory")]
    memory: Vec<String>,
    /// Image file to share as the application surface
    #[arg(long)]
    surface: Option<PathBuf>,
    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    if args.list_devices {
        println!("Input devices:\n{}", mentor_native_utils::device::get_available_inputs()?);
        println!("Output devices:\n{}", mentor_native_utils::device::get_available_outputs()?);
        return Ok(());
    }

    let endpoint = config.resolve_endpoint(args.endpoint)?;
    let mut session_config = SessionConfig::new(&endpoint).with_session_memory(args.memory);
    if let Some(context) = args.context.or(config.context_source.clone()) {
        session_config = session_config.with_context_source(&context);
    }
    if let Some(voice) = args.voice.or(config.voice_name.clone()) {
        session_config = session_config.with_voice_name(&voice);
    }
    if let Some(goal) = args.goal {
        session_config = session_config.with_student_goal(&goal);
    }

    // --- 4. Host Adapters ---
    let surface: Arc<dyn Surface> = match args.surface {
        Some(path) => Arc::new(FileSurface::new(path)),
        None => Arc::new(BlankSurface::default()),
    };
    let devices = SessionDevices {
        input: Arc::new(CpalInput::new(config.input_device.clone())),
        output: Arc::new(CpalOutput::new(config.output_device.clone())),
        surface,
        connector: Arc::new(WebSocketConnector::new()),
    };

    // --- 5. Run the Session ---
    let mut session = MentorSession::new(devices);
    let mut updates = session.subscribe();
    session
        .connect(session_config)
        .await
        .context("Failed to start mentor session")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut status = SessionStatus::Connecting;
    let mut printed = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Ctrl-C received; ending session");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.status != status {
                    status = snapshot.status;
                    tracing::info!("Session status: {:?}", status);
                }
                if snapshot.transcript.len() > printed {
                    println!("Mentor: {}", snapshot.transcript[printed..].trim());
                    printed = snapshot.transcript.len();
                }
                if snapshot.error != last_error {
                    if let Some(error) = &snapshot.error {
                        tracing::warn!("{}", error);
                    }
                    last_error = snapshot.error;
                }
                if status == SessionStatus::Error {
                    break;
                }
            }
        }
    }

    session.disconnect().await;
    tracing::info!("Session closed.");
    Ok(())
}
