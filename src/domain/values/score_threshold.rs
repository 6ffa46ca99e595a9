use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum normalized similarity a search result must reach (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct ScoreThreshold(f32);

impl ScoreThreshold {
    pub fn new(value: f32) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&value) {
            return Err(format!(
                "Score threshold must be between 0.0 and 1.0, got {value}"
            ));
        }
        Ok(ScoreThreshold(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn admits(&self, score: f32) -> bool {
        score >= self.0
    }
}

impl fmt::Display for ScoreThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
