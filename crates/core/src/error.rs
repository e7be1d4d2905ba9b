use crate::device::DeviceError;

/// Why a session could not start or had to stop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Microphone access was denied: {0}")]
    PermissionDenied(String),
    #[error("No audio input device is available")]
    DeviceUnavailable,
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Could not connect to the mentoring service: {0}")]
    Connection(String),
    #[error("Connection to the mentoring service was lost: {0}")]
    ChannelLost(String),
    #[error("Mentoring service error: {0}")]
    Service(String),
}

impl From<DeviceError> for SessionError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            DeviceError::NotFound => Self::DeviceUnavailable,
            DeviceError::Backend(msg) => Self::Device(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_and_absence_stay_distinguishable() {
        let denied = SessionError::from(DeviceError::PermissionDenied("user said no".into()));
        let absent = SessionError::from(DeviceError::NotFound);
        assert_ne!(denied, absent);
        assert!(denied.to_string().contains("denied"));
        assert!(absent.to_string().contains("No audio input device"));
    }
}
