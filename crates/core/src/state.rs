use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Active,
    Error,
}

/// Everything a host can observe about the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub error: Option<String>,
    pub transcript: String,
    pub is_speaking: bool,
    pub is_capturing: bool,
    /// Microphone level in `[0, 1]`.
    pub audio_level: f32,
}

/// Write side of the observable session state, shared by the components of
/// one orchestrator. Hosts only ever get the `watch::Receiver`.
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.tx.borrow().status
    }

    /// Fresh `connecting` state for a new session.
    pub(crate) fn begin(&self) {
        self.tx.send_replace(SessionSnapshot {
            status: SessionStatus::Connecting,
            ..SessionSnapshot::default()
        });
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.tx.send_if_modified(|s| {
            let changed = s.status != status;
            s.status = status;
            changed
        });
    }

    /// Fatal: status goes to `error` and the live flags drop.
    pub(crate) fn fail(&self, message: String) {
        self.tx.send_modify(|s| {
            s.status = SessionStatus::Error;
            s.error = Some(message);
            s.is_speaking = false;
            s.is_capturing = false;
            s.audio_level = 0.0;
        });
    }

    pub(crate) fn set_warning(&self, message: String) {
        self.tx.send_modify(|s| s.error = Some(message));
    }

    /// Clears `error` only if it still holds `message` and the session did
    /// not fail in the meantime.
    pub(crate) fn clear_warning(&self, message: &str) {
        self.tx.send_if_modified(|s| {
            if s.status != SessionStatus::Error && s.error.as_deref() == Some(message) {
                s.error = None;
                true
            } else {
                false
            }
        });
    }

    /// Appends in arrival order, space-joined. Each chunk is trimmed first,
    /// so whitespace at chunk edges is replaced by a single space and
    /// whitespace-only chunks are dropped.
    pub(crate) fn append_transcript(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.tx.send_modify(|s| {
            if !s.transcript.is_empty() {
                s.transcript.push(' ');
            }
            s.transcript.push_str(text);
        });
    }

    pub(crate) fn set_speaking(&self, speaking: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.is_speaking != speaking;
            s.is_speaking = speaking;
            changed
        });
    }

    pub(crate) fn set_capturing(&self, capturing: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.is_capturing != capturing;
            s.is_capturing = capturing;
            changed
        });
    }

    pub(crate) fn set_audio_level(&self, level: f32) {
        let level = level.clamp(0.0, 1.0);
        self.tx.send_if_modified(|s| {
            let changed = (s.audio_level - level).abs() > f32::EPSILON;
            s.audio_level = level;
            changed
        });
    }

    /// Drop the live flags once the session's tasks are gone.
    pub(crate) fn clear_activity(&self) {
        self.tx.send_if_modified(|s| {
            let changed = s.is_speaking || s.is_capturing || s.audio_level != 0.0;
            s.is_speaking = false;
            s.is_capturing = false;
            s.audio_level = 0.0;
            changed
        });
    }

    /// Back to `idle` after teardown. The transcript is kept until the next
    /// `connect`.
    pub(crate) fn reset_idle(&self) {
        self.tx.send_modify(|s| {
            s.status = SessionStatus::Idle;
            s.error = None;
            s.is_speaking = false;
            s.is_capturing = false;
            s.audio_level = 0.0;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_is_space_joined_in_order() {
        let state = SessionState::new();
        state.append_transcript("Hello");
        state.append_transcript("there");
        state.append_transcript("   ");
        assert_eq!(state.snapshot().transcript, "Hello there");
    }

    #[test]
    fn transcript_chunk_edges_collapse_to_one_space() {
        let state = SessionState::new();
        state.append_transcript("  Two thirds ");
        state.append_transcript("\nis bigger.\n");
        state.append_transcript("Right?");
        assert_eq!(state.snapshot().transcript, "Two thirds is bigger. Right?");
    }

    #[test]
    fn warning_clears_only_when_unchanged() {
        let state = SessionState::new();
        state.set_status(SessionStatus::Active);
        state.set_warning("first".into());
        state.set_warning("second".into());
        state.clear_warning("first");
        assert_eq!(state.snapshot().error.as_deref(), Some("second"));

        state.clear_warning("second");
        assert_eq!(state.snapshot().error, None);
    }

    #[test]
    fn fatal_error_is_not_cleared_by_warning_expiry() {
        let state = SessionState::new();
        state.set_warning("channel lost".into());
        state.fail("channel lost".into());
        state.clear_warning("channel lost");
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("channel lost"));
    }

    #[test]
    fn audio_level_is_clamped() {
        let state = SessionState::new();
        state.set_audio_level(4.0);
        assert_eq!(state.snapshot().audio_level, 1.0);
        state.set_audio_level(-1.0);
        assert_eq!(state.snapshot().audio_level, 0.0);
    }
}
