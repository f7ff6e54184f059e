//! Externally trained scaler and phase model, loaded once at startup.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::features::FeatureVector;

/// Categorical gait-phase model over scaled feature vectors.
pub trait PhaseClassifier: Send + Sync {
    /// Raw category name as the model was trained with it.
    fn classify(&self, scaled: &[f64; FeatureVector::LEN]) -> Result<String>;
}

/// Per-component standardization `(x - mean) / scale`.
///
/// Only constructed with exactly one mean and scale per feature, so
/// `transform` never indexes out of range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScalerFile")]
pub struct FeatureScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Deserialize)]
struct ScalerFile {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl TryFrom<ScalerFile> for FeatureScaler {
    type Error = anyhow::Error;

    fn try_from(file: ScalerFile) -> Result<Self> {
        FeatureScaler::new(file.mean, file.scale)
    }
}

impl FeatureScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        if mean.len() != FeatureVector::LEN || scale.len() != FeatureVector::LEN {
            bail!(
                "scaler expects {} components, has mean {} / scale {}",
                FeatureVector::LEN,
                mean.len(),
                scale.len()
            );
        }
        Ok(Self { mean, scale })
    }

    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FeatureVector::LEN],
            scale: vec![1.0; FeatureVector::LEN],
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scaler {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("malformed scaler {}", path.display()))
    }

    /// Components with zero scale are only centered, as the training-side
    /// scaler does for constant features.
    pub fn transform(&self, features: &FeatureVector) -> [f64; FeatureVector::LEN] {
        let mut scaled = [0.0; FeatureVector::LEN];
        for (i, value) in features.as_array().iter().enumerate() {
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            scaled[i] = (value - self.mean[i]) / scale;
        }
        scaled
    }
}

/// Linear one-vs-rest model: `argmax(coef · x + intercept)`.
///
/// A single coefficient row with two classes is the binary form: a positive
/// score selects the second class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPhaseModel {
    pub classes: Vec<String>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LinearPhaseModel {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read phase model {}", path.display()))?;
        let model: Self = serde_json::from_str(&contents)
            .with_context(|| format!("malformed phase model {}", path.display()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        let binary = self.classes.len() == 2 && self.coef.len() == 1;
        if self.classes.is_empty() {
            bail!("phase model has no classes");
        }
        if !binary && self.coef.len() != self.classes.len() {
            bail!(
                "phase model has {} classes but {} coefficient rows",
                self.classes.len(),
                self.coef.len()
            );
        }
        if self.intercept.len() != self.coef.len() {
            bail!(
                "phase model has {} intercepts for {} coefficient rows",
                self.intercept.len(),
                self.coef.len()
            );
        }
        if let Some(row) = self.coef.iter().find(|row| row.len() != FeatureVector::LEN) {
            bail!(
                "coefficient row has {} weights, expected {}",
                row.len(),
                FeatureVector::LEN
            );
        }
        Ok(())
    }

    fn scores(&self, scaled: &[f64; FeatureVector::LEN]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, bias)| row.iter().zip(scaled).map(|(w, x)| w * x).sum::<f64>() + bias)
            .collect()
    }
}

impl PhaseClassifier for LinearPhaseModel {
    fn classify(&self, scaled: &[f64; FeatureVector::LEN]) -> Result<String> {
        let scores = self.scores(scaled);

        if self.classes.len() == 2 && scores.len() == 1 {
            let index = usize::from(scores[0] > 0.0);
            return Ok(self.classes[index].clone());
        }

        let best = scores
            .iter()
            .enumerate()
            .filter(|(_, score)| score.is_finite())
            .fold(None::<(usize, f64)>, |best, (i, &score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((i, score)),
            });

        match best {
            Some((index, _)) => Ok(self.classes[index].clone()),
            None => bail!("phase model produced no finite score"),
        }
    }
}
