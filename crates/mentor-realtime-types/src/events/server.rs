use crate::audio::Base64EncodedAudioBytes;

/// Text that marks an untyped `error` message as an upstream warning.
///
/// Only consulted when the service omits `severity`.
pub const LEGACY_WARNING_MARKER: &str = "AI service error";

/// Every message the mentoring service can send.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Ready,
    Audio(AudioOutputEvent),
    Transcript(TranscriptEvent),
    TurnComplete,
    Error(ErrorEvent),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Audio(_) => "audio",
            Self::Transcript(_) => "transcript",
            Self::TurnComplete => "turnComplete",
            Self::Error(_) => "error",
        }
    }
}

/// `audio` event: PCM16 at 24 kHz.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioOutputEvent {
    data: Base64EncodedAudioBytes,
}

impl AudioOutputEvent {
    pub fn new(data: Base64EncodedAudioBytes) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_data(self) -> Base64EncodedAudioBytes {
        self.data
    }
}

/// `transcript` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEvent {
    text: String,
}

impl TranscriptEvent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// The session keeps running; the message is shown briefly.
    Warning,
    /// The session cannot continue.
    Fatal,
}

/// `error` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    severity: Option<ErrorSeverity>,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The severity as sent, or the legacy text classification when the
    /// service did not send one.
    pub fn severity(&self) -> ErrorSeverity {
        match self.severity {
            Some(severity) => severity,
            None if self.message.contains(LEGACY_WARNING_MARKER) => ErrorSeverity::Warning,
            None => ErrorSeverity::Fatal,
        }
    }
}
