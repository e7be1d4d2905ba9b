use crate::surface::{SESSION_OVERLAY_TAG, Surface};
use anyhow::{Context, ensure};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use mentor_realtime_types::image::Base64EncodedImage;

pub const JPEG_QUALITY: u8 = 60;

/// One encoded still of the host surface.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFrame {
    data: Base64EncodedImage,
    width: u32,
    height: u32,
}

impl VisualFrame {
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_data(self) -> Base64EncodedImage {
        self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Downscale to half the native resolution and encode as JPEG.
pub fn encode_frame(native: &RgbaImage) -> anyhow::Result<VisualFrame> {
    let (width, height) = native.dimensions();
    ensure!(width > 0 && height > 0, "surface rendered an empty image");

    let (width, height) = ((width / 2).max(1), (height / 2).max(1));
    let scaled = image::imageops::resize(native, width, height, FilterType::Triangle);
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgba8(scaled).to_rgb8();

    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .context("Failed to encode surface as JPEG")?;
    }

    Ok(VisualFrame {
        data: base64::engine::general_purpose::STANDARD.encode(&jpeg),
        width,
        height,
    })
}

/// Render the surface without session overlays and encode it.
pub fn capture_frame(surface: &dyn Surface) -> anyhow::Result<VisualFrame> {
    let native = surface
        .render(SESSION_OVERLAY_TAG)
        .context("Failed to render application surface")?;
    encode_frame(&native)
}
