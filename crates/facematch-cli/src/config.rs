use facematch_core::MATCH_THRESHOLD;
use std::path::PathBuf;
use std::str::FromStr;

/// Run configuration, loaded from environment variables and then overridden by flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the ONNX model files (default: ./models).
    pub model_dir: PathBuf,
    /// V4L2 device path for live captures (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture resolution.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames discarded before a capture while exposure settles.
    pub warmup_frames: usize,
    /// Frames tried after warmup before giving up on dark captures.
    pub capture_attempts: usize,
    /// Where capture files are written.
    pub capture_dir: PathBuf,
    /// Keep the capture file after it has been loaded.
    pub retain_capture: bool,
    /// Euclidean distance at or below which faces match.
    pub match_threshold: f32,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: lookup("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            camera_device: lookup("FACEMATCH_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            capture_width: parse_var(&lookup, "FACEMATCH_CAPTURE_WIDTH").unwrap_or(640),
            capture_height: parse_var(&lookup, "FACEMATCH_CAPTURE_HEIGHT").unwrap_or(480),
            warmup_frames: parse_var(&lookup, "FACEMATCH_WARMUP_FRAMES").unwrap_or(4),
            capture_attempts: parse_var(&lookup, "FACEMATCH_CAPTURE_ATTEMPTS").unwrap_or(10),
            capture_dir: lookup("FACEMATCH_CAPTURE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            retain_capture: lookup("FACEMATCH_RETAIN_CAPTURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            match_threshold: threshold_var(&lookup),
        }
    }
}

/// Parse a match threshold: a finite, non-negative distance.
pub fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold: f32 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid threshold {value:?}: {e}"))?;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(format!(
            "invalid threshold {value:?}: must be a finite, non-negative distance"
        ));
    }
    Ok(threshold)
}

fn threshold_var(lookup: &impl Fn(&str) -> Option<String>) -> f32 {
    let Some(value) = lookup("FACEMATCH_MATCH_THRESHOLD") else {
        return MATCH_THRESHOLD;
    };
    parse_threshold(&value).unwrap_or_else(|reason| {
        tracing::warn!(%reason, fallback = MATCH_THRESHOLD, "ignoring FACEMATCH_MATCH_THRESHOLD");
        MATCH_THRESHOLD
    })
}

/// Boolean environment value; empty, "0", "false", "no" and "off" are false.
fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty()
        || value == "0"
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("no")
        || value.eq_ignore_ascii_case("off"))
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
