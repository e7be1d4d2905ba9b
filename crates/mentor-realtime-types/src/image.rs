/// Image data encoded as base64
pub type Base64EncodedImage = String;

pub const SCREENSHOT_MIME_TYPE: &str = "image/jpeg";
