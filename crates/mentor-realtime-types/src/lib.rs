//now people using the types library can use these types
pub mod audio;
pub mod events;
pub mod image;

//re-export types for easier access
pub use events::client::{AudioAppendEvent, ClientEvent, ClientMessage, ScreenshotEvent, SetupMessage};
pub use events::server::{AudioOutputEvent, ErrorEvent, ErrorSeverity, ServerMessage, TranscriptEvent};
