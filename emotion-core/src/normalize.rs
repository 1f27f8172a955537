//! Turning raw classifier scores into a confidence distribution and a report.

use std::fmt;

use serde::Serialize;

use crate::mapping::FaceRegion;

/// Raw per-label scores exactly as the classifier produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for ScoreVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// Scores divided by their sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceVector(Vec<f32>);

impl ConfidenceVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index and value of the largest confidence. Ties go to the lowest index.
    pub fn top(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &value) in self.0.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, current)| value > current) {
                best = Some((index, value));
            }
        }
        // All-NaN output still names a label.
        best.or_else(|| self.0.first().map(|&value| (0, value)))
    }
}

/// Divide every score by the total.
///
/// A total that is not strictly positive (all zeros, negative mass, NaN) is replaced by 1, so
/// the scores pass through unscaled. Values are never clamped: negative scores stay negative.
pub fn normalize(scores: &ScoreVector) -> ConfidenceVector {
    let total: f32 = scores.0.iter().sum();
    let total = if total > 0.0 { total } else { 1.0 };
    ConfidenceVector(scores.0.iter().map(|&s| s / total).collect())
}

/// Confidence attached to one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelConfidence {
    pub label: String,
    pub confidence: f32,
}

/// Result of classifying one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionReport {
    /// Winning label.
    pub label: String,
    /// Its confidence in `[0, 1]` for well-behaved models.
    pub confidence: f32,
    /// Every label in model output order.
    pub distribution: Vec<LabelConfidence>,
    /// The face the report describes, in intensity-image coordinates.
    pub region: FaceRegion,
}

impl EmotionReport {
    /// Pair `labels` with `confidences`. `None` when there is nothing to report.
    pub fn new(
        labels: &[String],
        confidences: &ConfidenceVector,
        region: FaceRegion,
    ) -> Option<Self> {
        let (index, confidence) = confidences.top()?;
        let label = labels.get(index)?.clone();
        let distribution = labels
            .iter()
            .zip(confidences.as_slice())
            .map(|(label, &confidence)| LabelConfidence {
                label: label.clone(),
                confidence,
            })
            .collect();
        Some(Self {
            label,
            confidence,
            distribution,
            region,
        })
    }
}

impl fmt::Display for EmotionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Emotion: {} ({:.1}%)", self.label, self.confidence * 100.0)?;
        for entry in &self.distribution {
            write!(f, "\n{}: {:.1}%", entry.label, entry.confidence * 100.0)?;
        }
        Ok(())
    }
}
