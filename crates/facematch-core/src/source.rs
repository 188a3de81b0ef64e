//! Image sources.

use crate::error::{ImageLoadError, SourceError};
use image::imageops::FilterType;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Something that can produce one RGB image for a comparison.
pub trait ImageSource {
    /// Human-readable origin, used in logs and the report.
    fn describe(&self) -> String;

    fn load(&mut self) -> Result<RgbImage, SourceError>;
}

/// An image read from a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    resize: Option<(u32, u32)>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resize: None,
        }
    }

    /// Stretch the decoded image to exactly `width`×`height`.
    pub fn resized(mut self, resize: Option<(u32, u32)>) -> Self {
        self.resize = resize;
        self
    }
}

impl ImageSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&mut self) -> Result<RgbImage, SourceError> {
        Ok(load_image(&self.path, self.resize)?)
    }
}

/// Decode an image file to RGB, optionally resizing it.
pub fn load_image(path: &Path, resize: Option<(u32, u32)>) -> Result<RgbImage, ImageLoadError> {
    if !path.exists() {
        return Err(ImageLoadError::NotFound(path.to_path_buf()));
    }

    let decoded = image::open(path).map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let image = match resize {
        Some((w, h)) if decoded.width() != w || decoded.height() != h => {
            decoded.resize_exact(w, h, FilterType::Triangle).to_rgb8()
        }
        _ => decoded.to_rgb8(),
    };

    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "loaded image"
    );
    Ok(image)
}
