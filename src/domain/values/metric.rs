use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance function a collection's vector index ranks neighbours with.
///
/// Each metric declares how its raw backend value maps onto a normalized
/// similarity in `[0, 1]`, where 1 is the closest possible match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Squared Euclidean distance; smaller is closer.
    #[serde(rename = "L2")]
    L2,
    /// Inner product; larger is closer.
    #[serde(rename = "IP")]
    InnerProduct,
    /// Cosine similarity; larger is closer.
    #[serde(rename = "COSINE")]
    Cosine,
}

impl Metric {
    /// Name the index backend uses on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::L2 => "L2",
            Metric::InnerProduct => "IP",
            Metric::Cosine => "COSINE",
        }
    }

    /// Whether a larger raw value means a closer neighbour.
    pub fn higher_is_closer(&self) -> bool {
        match self {
            Metric::L2 => false,
            Metric::InnerProduct | Metric::Cosine => true,
        }
    }

    /// Convert a raw backend value into a similarity score in `[0, 1]`.
    pub fn similarity(&self, raw: f32) -> f32 {
        if raw.is_nan() {
            return 0.0;
        }
        match self {
            Metric::L2 => 1.0 / (1.0 + raw.max(0.0)),
            Metric::InnerProduct | Metric::Cosine => raw.clamp(0.0, 1.0),
        }
    }

    /// Raw value between two vectors as the backend would report it.
    ///
    /// Vectors of different length yield `None`.
    pub fn raw_score(&self, a: &[f32], b: &[f32]) -> Option<f32> {
        if a.len() != b.len() {
            return None;
        }
        let value = match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = (*x as f64) - (*y as f64);
                    d * d
                })
                .sum::<f64>(),
            Metric::InnerProduct => dot(a, b),
            Metric::Cosine => {
                let norm_a = dot(a, a).sqrt();
                let norm_b = dot(b, b).sqrt();
                let denom = norm_a * norm_b;
                if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
            }
        };
        Some(value as f32)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "L2" | "EUCLIDEAN" => Ok(Metric::L2),
            "IP" | "INNER_PRODUCT" | "INNERPRODUCT" => Ok(Metric::InnerProduct),
            "COSINE" => Ok(Metric::Cosine),
            _ => Err(format!("Unknown metric: {s}")),
        }
    }
}
