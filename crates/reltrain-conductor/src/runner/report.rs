use std::fmt;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Branch,
    Version,
    Build,
    Merge,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Branch => "branch",
            Phase::Version => "version",
            Phase::Build => "build",
            Phase::Merge => "merge",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub passed: bool,
    pub detail: String,
    pub duration_ms: u64,
}

impl PhaseReport {
    pub fn passed(phase: Phase, detail: impl Into<String>, duration: Duration) -> Self {
        Self::new(phase, true, detail.into(), duration)
    }

    pub fn failed(phase: Phase, detail: impl Into<String>, duration: Duration) -> Self {
        Self::new(phase, false, detail.into(), duration)
    }

    fn new(phase: Phase, passed: bool, detail: String, duration: Duration) -> Self {
        Self {
            phase,
            passed,
            detail: mask_secrets(&detail),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "ok" } else { "FAILED" };
        write!(
            f,
            "{:<8} {:<6} {} ({}ms)",
            self.phase, mark, self.detail, self.duration_ms
        )
    }
}

/// Mask credentials in text that ends up in reports or logs.
pub fn mask_secrets(text: &str) -> String {
    let patterns = [
        // credentials embedded in URLs
        (r"(https?://)[^/\s:@]+:[^/\s@]+@", "$1[MASKED]@"),
        (r"Basic\s+[a-zA-Z0-9+/=]+", "Basic [MASKED]"),
        (r"Bearer\s+[a-zA-Z0-9._\-]+", "Bearer [MASKED]"),
        (
            r"(?i)(password|secret|token|pat|api_key)=[^\s&]+",
            "$1=[MASKED]",
        ),
    ];

    let mut result = text.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, replacement).into_owned();
        }
    }
    result
}
