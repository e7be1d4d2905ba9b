use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `shutdown` waits for the writer to flush queued messages.
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);
