mod capture;
mod config;
mod report;

use anyhow::{Context, Result};
use capture::CaptureSource;
use clap::Parser;
use config::Config;
use facematch_core::{compare_faces, DetectorVariant, FaceModels, FileSource, ImageSource};
use report::Report;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "facematch",
    about = "Decide whether two images show the same person",
    version
)]
struct Cli {
    /// First image
    first: PathBuf,

    /// Second image (omit with --webcam)
    #[arg(required_unless_present = "webcam", conflicts_with = "webcam")]
    second: Option<PathBuf>,

    /// Take the second image from the webcam
    #[arg(long)]
    webcam: bool,

    /// Face detector: accurate (SCRFD) or fast (UltraFace)
    #[arg(long, default_value = "accurate")]
    detector: DetectorVariant,

    /// V4L2 device used with --webcam
    #[arg(long)]
    camera: Option<String>,

    /// Keep the webcam capture file after the comparison
    #[arg(long)]
    retain_capture: bool,

    /// Directory holding the ONNX models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Downscale images to 320x240 before detection
    #[arg(long, conflicts_with = "no_resize")]
    resize: bool,

    /// Process images at full resolution
    #[arg(long)]
    no_resize: bool,

    /// Distance at or below which faces are the same person
    #[arg(long, value_parser = config::parse_threshold)]
    threshold: Option<f32>,
}

impl Cli {
    /// Flags take precedence over the environment.
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(device) = &self.camera {
            config.camera_device = device.clone();
        }
        if self.retain_capture {
            config.retain_capture = true;
        }
        if let Some(threshold) = self.threshold {
            config.match_threshold = threshold;
        }
    }

    fn resize(&self) -> Option<(u32, u32)> {
        if self.resize {
            Some(facematch_core::detector::REDUCED_RESOLUTION)
        } else if self.no_resize {
            None
        } else {
            self.detector.default_resize()
        }
    }
}

enum ImageSourceKind {
    File(FileSource),
    Capture(CaptureSource),
}

impl ImageSourceKind {
    fn source_mut(&mut self) -> &mut dyn ImageSource {
        match self {
            ImageSourceKind::File(src) => src,
            ImageSourceKind::Capture(src) => src,
        }
    }

    fn retained_capture(&self) -> Option<&Path> {
        match self {
            ImageSourceKind::File(_) => None,
            ImageSourceKind::Capture(src) => src.retained_path(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    let resize = cli.resize();

    tracing::debug!(?config, detector = %cli.detector, ?resize, "configuration loaded");

    let started = Instant::now();

    let mut models = FaceModels::load(&config.model_dir, cli.detector).with_context(|| {
        format!(
            "failed to load {} models from {}",
            cli.detector,
            config.model_dir.display()
        )
    })?;

    let kind = models.recognizer_kind();
    if config.match_threshold != kind.calibrated_threshold() {
        tracing::warn!(
            recognizer = %kind,
            threshold = config.match_threshold,
            calibrated = kind.calibrated_threshold(),
            "match threshold differs from the recognizer's calibrated distance"
        );
    }

    let mut first = FileSource::new(&cli.first).resized(resize);
    let mut second = match &cli.second {
        Some(path) => ImageSourceKind::File(FileSource::new(path).resized(resize)),
        None => ImageSourceKind::Capture(CaptureSource::new(&config, resize)),
    };
    let first_label = first.describe();
    let second_label = second.source_mut().describe();

    let comparison = compare_faces(
        &mut first,
        second.source_mut(),
        &mut models,
        config.match_threshold,
    )
    .with_context(|| format!("failed to compare {first_label} with {second_label}"))?;

    if let Ok(json) = serde_json::to_string(&comparison) {
        tracing::debug!(result = %json, "comparison finished");
    }

    let report = Report {
        first: &first_label,
        second: &second_label,
        comparison: &comparison,
        retained_capture: second.retained_capture(),
        elapsed: started.elapsed(),
    };
    print!("{}", report.render());

    Ok(())
}
