//! Linear SHAP explainer
//!
//! For a linear model with independent features the exact Shapley value of
//! feature `i` is `coef[i] * (x[i] - E[x[i]])`, with the expectation taken
//! over a background sample. Values live in log-odds space and sum, together
//! with `expected_value`, to the model's decision function.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::model::{LogisticRegression, Row};
use crate::models::{AppError, AppResult, FEATURE_COUNT, FEATURE_NAMES};

#[derive(Debug, Clone)]
pub struct LinearExplainer {
    coef: Row,
    background_mean: Row,
    expected_value: f64,
}

impl LinearExplainer {
    pub fn new(model: &LogisticRegression, background: &[Row]) -> AppResult<Self> {
        if background.is_empty() {
            return Err(AppError::model_invalid(
                "Explainer needs at least one background row",
            ));
        }

        let n = background.len() as f64;
        let mut background_mean = [0.0; FEATURE_COUNT];
        for row in background {
            for (m, v) in background_mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        background_mean.iter_mut().for_each(|m| *m /= n);

        let expected_value = model.decision_function(&background_mean);

        Ok(Self {
            coef: model.coef,
            background_mean,
            expected_value,
        })
    }

    /// Log-odds of the average background applicant
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    pub fn shap_values(&self, scaled: &Row) -> Row {
        let mut values = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            values[i] = self.coef[i] * (scaled[i] - self.background_mean[i]);
        }
        values
    }

    pub fn explain(&self, scaled: &Row) -> Explanation {
        Explanation {
            values: self.shap_values(scaled),
        }
    }
}

/// Feature attributions, serialized as `{feature_name: value}`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Explanation {
    pub values: Row,
}

impl Explanation {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Feature with the largest absolute contribution
    pub fn dominant_feature(&self) -> &'static str {
        self.iter()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(name, _)| name)
            .unwrap_or(FEATURE_NAMES[0])
    }
}

impl Serialize for Explanation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}
