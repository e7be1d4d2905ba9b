/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate of the PCM16 audio the client streams to the service.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Number of samples in every outbound audio frame (~250 ms at 16 kHz).
pub const CAPTURE_FRAME_SAMPLES: usize = 4_000;

/// Sample rate of the PCM16 audio the service streams back.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;
