use crate::audio::Base64EncodedAudioBytes;
use crate::image::{Base64EncodedImage, SCREENSHOT_MIME_TYPE};

/// Anything the client writes to the channel.
///
/// The setup record is sent bare, without a `type` tag, as the first
/// message after the channel opens. Every later message is a tagged
/// [`ClientEvent`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Event(ClientEvent),
    Setup(SetupMessage),
}

impl ClientMessage {
    pub fn audio(data: Base64EncodedAudioBytes) -> Self {
        Self::Event(ClientEvent::Audio(AudioAppendEvent::new(data)))
    }

    pub fn screenshot(data: Base64EncodedImage) -> Self {
        Self::Event(ClientEvent::Screenshot(ScreenshotEvent::new(data)))
    }

    pub fn end() -> Self {
        Self::Event(ClientEvent::End)
    }

    /// Short label used in logs; never includes payload data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::Event(ClientEvent::Audio(_)) => "audio",
            Self::Event(ClientEvent::Screenshot(_)) => "screenshot",
            Self::Event(ClientEvent::End) => "end",
        }
    }
}

impl From<SetupMessage> for ClientMessage {
    fn from(setup: SetupMessage) -> Self {
        Self::Setup(setup)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Audio(AudioAppendEvent),
    Screenshot(ScreenshotEvent),
    End,
}

/// Initial session record describing who the mentor is talking to.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    context_source: String,
    student_goal: String,
    session_memory: Vec<String>,
    voice_name: String,
}

impl SetupMessage {
    pub fn new(context_source: &str, voice_name: &str) -> Self {
        Self {
            context_source: context_source.to_string(),
            student_goal: String::new(),
            session_memory: Vec::new(),
            voice_name: voice_name.to_string(),
        }
    }

    pub fn with_student_goal(mut self, student_goal: &str) -> Self {
        self.student_goal = student_goal.to_string();
        self
    }

    pub fn with_session_memory(mut self, session_memory: Vec<String>) -> Self {
        self.session_memory = session_memory;
        self
    }

    pub fn context_source(&self) -> &str {
        &self.context_source
    }

    pub fn student_goal(&self) -> &str {
        &self.student_goal
    }

    pub fn session_memory(&self) -> &[String] {
        &self.session_memory
    }

    pub fn voice_name(&self) -> &str {
        &self.voice_name
    }
}

/// `audio` event: one PCM16 frame at 16 kHz.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioAppendEvent {
    data: Base64EncodedAudioBytes,
}

impl AudioAppendEvent {
    pub fn new(data: Base64EncodedAudioBytes) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

/// `screenshot` event: one JPEG still of the host surface.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotEvent {
    data: Base64EncodedImage,
    mime_type: String,
}

impl ScreenshotEvent {
    pub fn new(data: Base64EncodedImage) -> Self {
        Self {
            data,
            mime_type: SCREENSHOT_MIME_TYPE.to_string(),
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setup_is_sent_without_a_type_tag() {
        let setup = SetupMessage::new("resume", "Aoede")
            .with_student_goal("land a backend role")
            .with_session_memory(vec!["talked about tokio".to_string()]);
        let value = serde_json::to_value(ClientMessage::from(setup)).unwrap();

        assert_eq!(
            value,
            json!({
                "contextSource": "resume",
                "studentGoal": "land a backend role",
                "sessionMemory": ["talked about tokio"],
                "voiceName": "Aoede",
            })
        );
    }

    #[test]
    fn tagged_events_use_wire_names() {
        let audio = serde_json::to_value(ClientMessage::audio("AAA=".to_string())).unwrap();
        assert_eq!(audio, json!({"type": "audio", "data": "AAA="}));

        let shot = serde_json::to_value(ClientMessage::screenshot("/9j/".to_string())).unwrap();
        assert_eq!(
            shot,
            json!({"type": "screenshot", "data": "/9j/", "mimeType": "image/jpeg"})
        );

        let end = serde_json::to_value(ClientMessage::end()).unwrap();
        assert_eq!(end, json!({"type": "end"}));
    }

    #[test]
    fn untagged_record_parses_back_as_setup() {
        let text = r#"{"contextSource":"general","studentGoal":"","sessionMemory":[],"voiceName":"Puck"}"#;
        let message: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(message.kind(), "setup");

        let message: ClientMessage = serde_json::from_str(r#"{"type":"end"}"#).unwrap();
        assert_eq!(message, ClientMessage::end());
    }
}
