use image::RgbaImage;
#[cfg(test)]
use mockall::automock;

/// Tag carried by session-overlay elements (the mentor panel, captions,
/// the level meter). Surfaces must leave these out of captures.
pub const SESSION_OVERLAY_TAG: &str = "mentor-overlay";

/// The host application's own rendered surface.
#[cfg_attr(test, automock)]
pub trait Surface: Send + Sync {
    /// Render the root surface at native resolution, omitting every element
    /// tagged `exclude_tag`.
    fn render(&self, exclude_tag: &str) -> anyhow::Result<RgbaImage>;
}
