use anyhow::Context;
use image::{Rgba, RgbaImage};
use mentor_core::Surface;
use std::path::PathBuf;

/// Serves an image file as the application surface. The file is read again
/// on every capture, so whatever writes it controls what the mentor sees.
/// It has no overlay elements to leave out.
#[derive(Debug, Clone)]
pub struct FileSurface {
    path: PathBuf,
}

impl FileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Surface for FileSurface {
    fn render(&self, _exclude_tag: &str) -> anyhow::Result<RgbaImage> {
        let image = image::open(&self.path)
            .with_context(|| format!("Failed to read surface image {}", self.path.display()))?;
        Ok(image.to_rgba8())
    }
}

/// Solid fill, used when no surface image is configured.
#[derive(Debug, Clone)]
pub struct BlankSurface {
    width: u32,
    height: u32,
}

impl Default for BlankSurface {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Surface for BlankSurface {
    fn render(&self, _exclude_tag: &str) -> anyhow::Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(
            self.width,
            self.height,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::SESSION_OVERLAY_TAG;

    #[test]
    fn file_surface_reads_the_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface.png");
        RgbaImage::new(64, 48).save(&path).unwrap();

        let surface = FileSurface::new(&path);
        assert_eq!(surface.render(SESSION_OVERLAY_TAG).unwrap().dimensions(), (64, 48));

        RgbaImage::new(32, 32).save(&path).unwrap();
        assert_eq!(surface.render(SESSION_OVERLAY_TAG).unwrap().dimensions(), (32, 32));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let surface = FileSurface::new(dir.path().join("absent.png"));
        let err = surface.render(SESSION_OVERLAY_TAG).unwrap_err();
        assert!(err.to_string().contains("absent.png"));
    }

    #[test]
    fn blank_surface_encodes() {
        let frame = mentor_core::visual::capture_frame(&BlankSurface::default()).unwrap();
        assert_eq!(frame.dimensions(), (640, 360));
    }
}
