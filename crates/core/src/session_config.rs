use mentor_realtime_types::SetupMessage;
use std::time::Duration;

pub const DEFAULT_CONTEXT_SOURCE: &str = "general";
pub const DEFAULT_VOICE_NAME: &str = "Puck";

/// Caller-supplied settings for one session. Immutable once passed to
/// `connect`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    endpoint_url: String,
    context_source: String,
    student_goal: String,
    session_memory: Vec<String>,
    voice_name: String,
}

impl SessionConfig {
    pub fn new(endpoint_url: &str) -> Self {
        Self {
            endpoint_url: endpoint_url.to_string(),
            context_source: DEFAULT_CONTEXT_SOURCE.to_string(),
            student_goal: String::new(),
            session_memory: Vec::new(),
            voice_name: DEFAULT_VOICE_NAME.to_string(),
        }
    }

    pub fn with_context_source(mut self, context_source: &str) -> Self {
        self.context_source = context_source.to_string();
        self
    }

    pub fn with_student_goal(mut self, student_goal: &str) -> Self {
        self.student_goal = student_goal.to_string();
        self
    }

    /// Prior-turn summaries, oldest first.
    pub fn with_session_memory(mut self, session_memory: Vec<String>) -> Self {
        self.session_memory = session_memory;
        self
    }

    pub fn with_voice_name(mut self, voice_name: &str) -> Self {
        self.voice_name = voice_name.to_string();
        self
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
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

    /// The record sent as the first message on a fresh channel.
    pub fn setup_message(&self) -> SetupMessage {
        SetupMessage::new(&self.context_source, &self.voice_name)
            .with_student_goal(&self.student_goal)
            .with_session_memory(self.session_memory.clone())
    }
}

/// A selectable synthesis voice, as listed by the signaling endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VoiceOption {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Timing knobs for the session machinery.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Period of the visual context capture.
    pub screenshot_interval: Duration,
    /// How long a transient service warning stays in the `error` field.
    pub warning_ttl: Duration,
    /// Cadence of `audio_level` updates.
    pub level_tick: Duration,
    /// Upper bound on how long `disconnect` waits for a graceful close.
    pub teardown_timeout: Duration,
    /// Bound of the channel queues.
    pub channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            screenshot_interval: Duration::from_millis(4000),
            warning_ttl: Duration::from_secs(3),
            level_tick: Duration::from_millis(33),
            teardown_timeout: Duration::from_secs(2),
            channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let config = SessionConfig::new("wss://mentor.test");
        assert_eq!(config.context_source(), "general");
        assert_eq!(config.voice_name(), DEFAULT_VOICE_NAME);
        assert!(config.student_goal().is_empty());
        assert!(config.session_memory().is_empty());
    }

    #[test]
    fn setup_message_carries_every_field() {
        let config = SessionConfig::new("wss://mentor.test")
            .with_context_source("roadmap")
            .with_student_goal("ship a CLI")
            .with_session_memory(vec!["first".into(), "second".into()])
            .with_voice_name("Aoede");
        let setup = config.setup_message();

        assert_eq!(setup.context_source(), "roadmap");
        assert_eq!(setup.student_goal(), "ship a CLI");
        assert_eq!(setup.session_memory(), ["first", "second"]);
        assert_eq!(setup.voice_name(), "Aoede");
    }

    #[test]
    fn voice_catalogue_entries_deserialize() {
        let voice: VoiceOption = serde_json::from_str(
            r#"{"id":"Aoede","name":"Aoede","description":"Breezy"}"#,
        )
        .unwrap();
        assert_eq!(voice.id, "Aoede");
    }
}
