use crate::labels::{NUM_CLASSES, OctClass};
use std::fmt;

const SUM_TOLERANCE: f32 = 1e-3;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DistributionError {
    #[error("expected 4 class scores, model returned {0}")]
    WrongLength(usize),
    #[error("class score {index} is not a probability: {value}")]
    InvalidScore { index: usize, value: f32 },
    #[error("class scores sum to {0}, not 1")]
    NotNormalized(f32),
}

/// Categorical distribution over the four classes, in label index order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionVector([f32; NUM_CLASSES]);

impl TryFrom<Vec<f32>> for PredictionVector {
    type Error = DistributionError;

    fn try_from(scores: Vec<f32>) -> Result<Self, Self::Error> {
        let probs: [f32; NUM_CLASSES] = scores
            .as_slice()
            .try_into()
            .map_err(|_| DistributionError::WrongLength(scores.len()))?;

        if let Some((index, &value)) = probs
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p < 0.0)
        {
            return Err(DistributionError::InvalidScore { index, value });
        }

        let sum: f32 = probs.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(DistributionError::NotNormalized(sum));
        }
        Ok(Self(probs))
    }
}

impl PredictionVector {
    pub fn probability(&self, class: OctClass) -> f32 {
        self.0[class.index()]
    }

    /// Strict argmax; on ties the lowest index wins.
    pub fn argmax(&self) -> OctClass {
        let mut best = 0;
        for (i, &p) in self.0.iter().enumerate().skip(1) {
            if p > self.0[best] {
                best = i;
            }
        }
        OctClass::ALL[best]
    }
}

/// The committed class for one image plus the full distribution it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: OctClass,
    pub probabilities: PredictionVector,
}

impl From<PredictionVector> for Prediction {
    fn from(probabilities: PredictionVector) -> Self {
        Self {
            class: probabilities.argmax(),
            probabilities,
        }
    }
}

pub fn percent(probability: f32) -> f32 {
    probability * 100.0
}

/// Two decimals, computed and formatted in `f32`.
pub fn format_percent(probability: f32) -> String {
    format!("{:.2}%", percent(probability))
}

impl Prediction {
    pub fn label(&self) -> &'static str {
        self.class.label()
    }

    pub fn confidence(&self) -> f32 {
        percent(self.probabilities.probability(self.class))
    }

    pub fn confidence_text(&self) -> String {
        format_percent(self.probabilities.probability(self.class))
    }

    /// Every class with its percentage, in label index order.
    pub fn breakdown(&self) -> impl Iterator<Item = (OctClass, f32)> + '_ {
        OctClass::ALL
            .into_iter()
            .map(|class| (class, percent(self.probabilities.probability(class))))
    }

    pub fn breakdown_lines(&self) -> Vec<String> {
        OctClass::ALL
            .into_iter()
            .map(|class| {
                format!(
                    "{}: {}",
                    class.label(),
                    format_percent(self.probabilities.probability(class))
                )
            })
            .collect()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prediction: {}", self.label())?;
        writeln!(f, "Confidence: {}", self.confidence_text())?;
        writeln!(f, "Prediction Breakdown")?;
        for line in self.breakdown_lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
