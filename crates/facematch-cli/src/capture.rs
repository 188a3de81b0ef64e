//! Live webcam source: capture a still, write it to disk, load it like any file.

use crate::config::Config;
use chrono::Local;
use facematch_core::source::{load_image, ImageSource};
use facematch_core::SourceError;
use facematch_hw::{Camera, Frame};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Captures are re-decoded for matching, so keep encoding loss minimal.
const CAPTURE_JPEG_QUALITY: u8 = 100;

pub struct CaptureSource {
    device: String,
    width: u32,
    height: u32,
    warmup_frames: usize,
    attempts: usize,
    capture_dir: PathBuf,
    retain: bool,
    resize: Option<(u32, u32)>,
    retained: Option<PathBuf>,
}

impl CaptureSource {
    pub fn new(config: &Config, resize: Option<(u32, u32)>) -> Self {
        Self {
            device: config.camera_device.clone(),
            width: config.capture_width,
            height: config.capture_height,
            warmup_frames: config.warmup_frames,
            attempts: config.capture_attempts,
            capture_dir: config.capture_dir.clone(),
            retain: config.retain_capture,
            resize,
            retained: None,
        }
    }

    /// Path of the kept capture file, once one has been taken with retention on.
    pub fn retained_path(&self) -> Option<&Path> {
        self.retained.as_deref()
    }

    fn capture_frame(&self) -> Result<Frame, SourceError> {
        let camera = Camera::open(&self.device, self.width, self.height).map_err(capture_error)?;
        let frame = camera
            .capture_still(self.warmup_frames, self.attempts)
            .map_err(capture_error)?;
        tracing::info!(
            device = %self.device,
            width = frame.width,
            height = frame.height,
            brightness = frame.avg_brightness(),
            "captured frame"
        );
        Ok(frame)
    }

    /// Load a written capture file, then delete it unless retention is on.
    fn load_capture(&mut self, path: PathBuf) -> Result<RgbImage, SourceError> {
        let loaded = load_image(&path, self.resize);

        if self.retain {
            tracing::info!(path = %path.display(), "capture retained");
            self.retained = Some(path);
        } else if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove capture file");
        }

        Ok(loaded?)
    }
}

impl ImageSource for CaptureSource {
    fn describe(&self) -> String {
        format!("webcam {}", self.device)
    }

    fn load(&mut self) -> Result<RgbImage, SourceError> {
        let frame = self.capture_frame()?;
        let path = write_capture(&frame, &self.capture_dir)?;
        self.load_capture(path)
    }
}

fn capture_error<E>(err: E) -> SourceError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SourceError::Capture(Box::new(err))
}

/// Encode a frame as JPEG under `dir` with a timestamped name.
fn write_capture(frame: &Frame, dir: &Path) -> Result<PathBuf, SourceError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        SourceError::Capture(
            format!(
                "frame buffer of {} bytes does not fit {}x{} RGB",
                frame.data.len(),
                frame.width,
                frame.height
            )
            .into(),
        )
    })?;

    std::fs::create_dir_all(dir).map_err(capture_error)?;
    let path = dir.join(format!(
        "facematch-capture-{}.jpg",
        Local::now().format("%Y%m%dT%H%M%S%.3f")
    ));
    let mut writer = BufWriter::new(File::create(&path).map_err(capture_error)?);
    JpegEncoder::new_with_quality(&mut writer, CAPTURE_JPEG_QUALITY)
        .encode_image(&image)
        .map_err(capture_error)?;
    writer.flush().map_err(capture_error)?;
    tracing::debug!(path = %path.display(), "wrote capture file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey_frame(width: u32, height: u32, level: u8) -> Frame {
        Frame {
            data: vec![level; (width * height * 3) as usize],
            width,
            height,
            sequence: 1,
        }
    }

    fn source(dir: &Path, retain: bool) -> CaptureSource {
        let config = Config {
            capture_dir: dir.to_path_buf(),
            retain_capture: retain,
            camera_device: "/dev/facematch-no-such-camera".into(),
            ..Config::from_env()
        };
        CaptureSource::new(&config, None)
    }

    #[test]
    fn test_write_capture_creates_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(&grey_frame(32, 24, 120), dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("facematch-capture-")));
    }

    #[test]
    fn test_write_capture_keeps_fine_detail() {
        // Grey noise spreads energy over every DCT frequency, which coarse
        // quantization would visibly distort.
        let (width, height) = (32u32, 24u32);
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * 73 + y * 151 + x * y * 31) % 256) as u8))
            .flat_map(|v| [v, v, v])
            .collect();
        let frame = Frame { data, width, height, sequence: 1 };

        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(&frame, dir.path()).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();

        let total: u64 = decoded
            .as_raw()
            .iter()
            .zip(frame.data.iter())
            .map(|(a, b)| u64::from(a.abs_diff(*b)))
            .sum();
        let mean = total as f64 / frame.data.len() as f64;
        assert!(mean < 3.0, "mean absolute error {mean}");
    }

    #[test]
    fn test_write_capture_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = grey_frame(32, 24, 120);
        frame.data.truncate(10);
        assert!(matches!(write_capture(&frame, dir.path()), Err(SourceError::Capture(_))));
    }

    #[test]
    fn test_capture_removed_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(&grey_frame(32, 24, 120), dir.path()).unwrap();

        let mut src = source(dir.path(), false);
        let image = src.load_capture(path.clone()).unwrap();
        assert_eq!(image.dimensions(), (32, 24));
        assert!(!path.exists());
        assert!(src.retained_path().is_none());
    }

    #[test]
    fn test_capture_retained_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_capture(&grey_frame(32, 24, 120), dir.path()).unwrap();

        let mut src = source(dir.path(), true);
        src.load_capture(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(src.retained_path(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_camera_is_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = source(dir.path(), false).load().unwrap_err();
        assert!(matches!(err, SourceError::Capture(_)));
        assert!(err.to_string().contains("device not found"));
    }

    #[test]
    fn test_describe_names_device() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(source(dir.path(), false).describe(), "webcam /dev/facematch-no-such-camera");
    }
}
