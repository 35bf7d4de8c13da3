use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    Low,
    Medium,
    High,
    Excellent,
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PerformanceLevel::Low => "low",
            PerformanceLevel::Medium => "medium",
            PerformanceLevel::High => "high",
            PerformanceLevel::Excellent => "excellent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerformanceColor {
    pub level: PerformanceLevel,
    pub background: &'static str,
    pub dark_text: bool,
}

/// Bands a 1-5 score. A missing score is shown as `Medium`.
pub fn performance_level(score: Option<f64>) -> PerformanceLevel {
    match score {
        None => PerformanceLevel::Medium,
        Some(s) if s >= 3.3 => PerformanceLevel::Excellent,
        Some(s) if s >= 3.0 => PerformanceLevel::High,
        Some(s) if s >= 2.71 => PerformanceLevel::Medium,
        Some(_) => PerformanceLevel::Low,
    }
}

pub fn performance_color(score: Option<f64>) -> PerformanceColor {
    let level = performance_level(score);
    let (background, dark_text) = match level {
        PerformanceLevel::Excellent => ("#271DED", false),
        PerformanceLevel::High => ("#257916", false),
        PerformanceLevel::Medium => ("#FFDB3D", true),
        PerformanceLevel::Low => ("#FF5D38", false),
    };
    PerformanceColor {
        level,
        background,
        dark_text,
    }
}
