//! Credit Scoring Model
//!
//! Standard scaler + binary logistic regression over the four
//! alternative-data features. Artifacts are stored as a single JSON file
//! holding the scaler, the fitted weights and a background sample used by
//! the explainer.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::explainer::{Explanation, LinearExplainer};
use crate::models::{AppError, AppResult, ErrorCode, FeatureVector, FEATURE_COUNT};

/// Artifact format version written by this crate
pub const ARTIFACT_VERSION: u32 = 1;

/// One model input row
pub type Row = [f64; FEATURE_COUNT];

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[inline]
fn dot(a: &Row, b: &Row) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================
// STANDARD SCALER
// ============================================

/// Zero-mean / unit-variance feature scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Row,
    pub scale: Row,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    /// Constant columns get a scale of 1.0.
    pub fn fit(rows: &[Row]) -> AppResult<Self> {
        if rows.is_empty() {
            return Err(AppError::new(
                ErrorCode::ModelTrainingFailed,
                "Cannot fit scaler on an empty dataset",
            ));
        }

        let n = rows.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = [0.0; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                let d = row[i] - mean[i];
                scale[i] += d * d;
            }
        }
        for s in scale.iter_mut() {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Ok(Self { mean, scale })
    }

    pub fn transform(&self, row: &Row) -> Row {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (row[i] - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn transform_all(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

// ============================================
// LOGISTIC REGRESSION
// ============================================

/// Gradient descent settings
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Inverse L2 regularization strength
    pub c: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once every gradient component is below this
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 0.5,
            max_iter: 5000,
            tolerance: 1e-6,
        }
    }
}

/// Binary logistic regression on scaled features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Row,
    pub intercept: f64,
}

impl LogisticRegression {
    /// Log-odds of the positive class
    pub fn decision_function(&self, scaled: &Row) -> f64 {
        dot(&self.coef, scaled) + self.intercept
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, scaled: &Row) -> f64 {
        sigmoid(self.decision_function(scaled))
    }

    /// Full-batch gradient descent on mean log-loss plus `||w||^2 / (2 C n)`.
    /// Returns the model and the number of iterations run.
    pub fn fit(rows: &[Row], labels: &[bool], options: &FitOptions) -> AppResult<(Self, usize)> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(AppError::new(
                ErrorCode::ModelTrainingFailed,
                format!(
                    "Training data mismatch: {} rows, {} labels",
                    rows.len(),
                    labels.len()
                ),
            ));
        }
        if options.c <= 0.0 {
            return Err(AppError::new(
                ErrorCode::ModelTrainingFailed,
                "Regularization C must be positive",
            ));
        }

        let n = rows.len() as f64;
        let mut model = Self {
            coef: [0.0; FEATURE_COUNT],
            intercept: 0.0,
        };

        let mut iterations = 0;
        for iter in 0..options.max_iter {
            iterations = iter + 1;

            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (row, &label) in rows.iter().zip(labels.iter()) {
                let err = model.predict_proba(row) - if label { 1.0 } else { 0.0 };
                for i in 0..FEATURE_COUNT {
                    grad_w[i] += err * row[i];
                }
                grad_b += err;
            }
            for i in 0..FEATURE_COUNT {
                grad_w[i] = grad_w[i] / n + model.coef[i] / (options.c * n);
            }
            grad_b /= n;

            let max_grad = grad_w
                .iter()
                .chain(std::iter::once(&grad_b))
                .fold(0.0_f64, |acc, g| acc.max(g.abs()));
            if max_grad < options.tolerance {
                debug!(iterations, "Logistic regression converged");
                break;
            }

            for i in 0..FEATURE_COUNT {
                model.coef[i] -= options.learning_rate * grad_w[i];
            }
            model.intercept -= options.learning_rate * grad_b;
        }

        Ok((model, iterations))
    }

    /// Fraction of rows whose 0.5-thresholded prediction matches the label
    pub fn accuracy(&self, rows: &[Row], labels: &[bool]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let correct = rows
            .iter()
            .zip(labels.iter())
            .filter(|(row, &label)| (self.predict_proba(row) >= 0.5) == label)
            .count();
        correct as f64 / rows.len() as f64
    }
}

// ============================================
// ARTIFACT
// ============================================

/// Everything needed to score and explain, persisted as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub scaler: StandardScaler,
    pub model: LogisticRegression,
    /// Scaled reference rows for the explainer
    pub background: Vec<Row>,
}

impl ModelArtifact {
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::with_source(
                ErrorCode::ModelLoadFailed,
                format!("Failed to read model artifact {}", path.display()),
                e,
            )
        })?;
        let artifact: Self = serde_json::from_str(&raw)?;
        artifact.validate()?;
        info!(path = %path.display(), version = artifact.version, "Model artifact loaded");
        Ok(artifact)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Model artifact saved");
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(AppError::model_invalid(format!(
                "Unsupported artifact version {} (expected {})",
                self.version, ARTIFACT_VERSION
            )));
        }
        if self.background.is_empty() {
            return Err(AppError::model_invalid("Background dataset is empty"));
        }
        let finite = self
            .scaler
            .mean
            .iter()
            .chain(self.model.coef.iter())
            .chain(std::iter::once(&self.model.intercept))
            .chain(self.background.iter().flatten())
            .all(|v| v.is_finite());
        if !finite {
            return Err(AppError::model_invalid("Artifact contains non-finite values"));
        }
        if self.scaler.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(AppError::model_invalid("Scaler scale must be positive"));
        }
        Ok(())
    }
}

// ============================================
// UNDERWRITING MODEL
// ============================================

/// Loaded model ready to score applicants
#[derive(Debug, Clone)]
pub struct UnderwritingModel {
    artifact: ModelArtifact,
    explainer: LinearExplainer,
}

impl UnderwritingModel {
    pub fn new(artifact: ModelArtifact) -> AppResult<Self> {
        artifact.validate()?;
        let explainer = LinearExplainer::new(&artifact.model, &artifact.background)?;
        Ok(Self { artifact, explainer })
    }

    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        Self::new(ModelArtifact::load(path)?)
    }

    /// Approval score on a 0-100 scale
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let scaled = self.artifact.scaler.transform(&features.as_array());
        self.artifact.model.predict_proba(&scaled) * 100.0
    }

    /// Per-feature attribution of the log-odds
    pub fn explain(&self, features: &FeatureVector) -> Explanation {
        let scaled = self.artifact.scaler.transform(&features.as_array());
        self.explainer.explain(&scaled)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn explainer(&self) -> &LinearExplainer {
        &self.explainer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_artifact() -> ModelArtifact {
        ModelArtifact {
            version: ARTIFACT_VERSION,
            scaler: StandardScaler {
                mean: [10.0, 100.0, 0.5, 5.0],
                scale: [5.0, 50.0, 0.25, 2.5],
            },
            model: LogisticRegression {
                coef: [1.0, 2.0, 0.5, 0.1],
                intercept: 0.0,
            },
            background: vec![[0.0; FEATURE_COUNT], [1.0, -1.0, 0.5, 0.0]],
        }
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn test_scaler_fit_transform() {
        let rows = vec![[1.0, 2.0, 3.0, 7.0], [3.0, 2.0, 5.0, 7.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean, [2.0, 2.0, 4.0, 7.0]);
        // constant columns keep scale 1
        assert_eq!(scaler.scale, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(scaler.transform(&rows[0]), [-1.0, 0.0, -1.0, 0.0]);
        assert!(StandardScaler::fit(&[]).is_err());
    }

    #[test]
    fn test_logistic_fit_separable() {
        let rows: Vec<Row> = (0..40)
            .map(|i| {
                let x = i as f64 / 10.0 - 2.0;
                [x, 0.0, 0.0, 0.0]
            })
            .collect();
        let labels: Vec<bool> = rows.iter().map(|r| r[0] > 0.0).collect();

        let (model, iterations) =
            LogisticRegression::fit(&rows, &labels, &FitOptions::default()).unwrap();
        assert!(iterations > 0);
        assert!(model.coef[0] > 0.0);
        assert!(model.accuracy(&rows, &labels) >= 0.95);
    }

    #[test]
    fn test_fit_rejects_mismatched_labels() {
        let err = LogisticRegression::fit(&[[0.0; 4]], &[], &FitOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelTrainingFailed);
    }

    #[test]
    fn test_score_range_and_monotonicity() {
        let model = UnderwritingModel::new(toy_artifact()).unwrap();
        let weak = FeatureVector::new(0.0, 10.0, 0.0, 0.0);
        let strong = FeatureVector::new(20.0, 200.0, 1.0, 10.0);
        let weak_score = model.score(&weak);
        let strong_score = model.score(&strong);
        assert!((0.0..=100.0).contains(&weak_score));
        assert!((0.0..=100.0).contains(&strong_score));
        assert!(strong_score > weak_score);
    }

    #[test]
    fn test_artifact_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/model.json");
        let artifact = toy_artifact();
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.model, artifact.model);
        assert_eq!(loaded.background.len(), 2);
    }

    #[test]
    fn test_artifact_validation() {
        let mut artifact = toy_artifact();
        artifact.background.clear();
        assert_eq!(artifact.validate().unwrap_err().code, ErrorCode::ModelInvalid);

        let mut artifact = toy_artifact();
        artifact.scaler.scale[2] = 0.0;
        assert!(artifact.validate().is_err());

        let mut artifact = toy_artifact();
        artifact.model.intercept = f64::NAN;
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn test_missing_artifact_is_load_error() {
        let err = ModelArtifact::load("/nonexistent/model.json").unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelLoadFailed);
    }
}
