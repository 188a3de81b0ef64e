//! Console report.

use facematch_core::Comparison;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

pub struct Report<'a> {
    pub first: &'a str,
    pub second: &'a str,
    pub comparison: &'a Comparison,
    pub retained_capture: Option<&'a Path>,
    pub elapsed: Duration,
}

impl Report<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Comparing {} with {}", self.first, self.second);

        match self.comparison {
            Comparison::NoFace { missing } => {
                let _ = writeln!(out, "No face detected in {missing}; no comparison made.");
            }
            Comparison::Match(verdict) => {
                let _ = writeln!(
                    out,
                    "Distance between faces: {:.4} (threshold {:.2})",
                    verdict.distance, verdict.threshold
                );
                if verdict.same_person {
                    let _ = writeln!(out, "The faces are the same person.");
                } else {
                    let _ = writeln!(out, "The faces are different people.");
                }
            }
        }

        if let Some(path) = self.retained_capture {
            let _ = writeln!(out, "Capture kept at {}", path.display());
        }
        let _ = writeln!(out, "Time taken: {:.2}s", self.elapsed.as_secs_f64());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::{MatchVerdict, Side, MATCH_THRESHOLD};

    fn render(comparison: &Comparison, retained: Option<&Path>) -> String {
        Report {
            first: "a.jpg",
            second: "b.jpg",
            comparison,
            retained_capture: retained,
            elapsed: Duration::from_millis(1500),
        }
        .render()
    }

    #[test]
    fn test_render_same_person() {
        let out = render(&Comparison::Match(MatchVerdict::decide(0.0, MATCH_THRESHOLD)), None);
        assert!(out.contains("Comparing a.jpg with b.jpg"));
        assert!(out.contains("Distance between faces: 0.0000 (threshold 0.60)"));
        assert!(out.contains("same person"));
        assert!(out.contains("Time taken: 1.50s"));
        assert!(!out.contains("Capture kept"));
    }

    #[test]
    fn test_render_different_people() {
        let out = render(&Comparison::Match(MatchVerdict::decide(1.1, MATCH_THRESHOLD)), None);
        assert!(out.contains("different people"));
    }

    #[test]
    fn test_render_no_face_has_no_verdict() {
        let out = render(&Comparison::NoFace { missing: Side::Second }, None);
        assert!(out.contains("No face detected in the second image"));
        assert!(!out.contains("Distance"));
        assert!(!out.contains("same person"));
        assert!(!out.contains("different people"));
    }

    #[test]
    fn test_render_retained_capture() {
        let path = Path::new("/tmp/facematch-capture-x.jpg");
        let out = render(&Comparison::NoFace { missing: Side::Both }, Some(path));
        assert!(out.contains("No face detected in either image"));
        assert!(out.contains("Capture kept at /tmp/facematch-capture-x.jpg"));
    }
}
