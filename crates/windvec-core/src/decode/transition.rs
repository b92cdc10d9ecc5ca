use serde::{Deserialize, Serialize};

use crate::error::{Result, WindvecError};

/// Additive score for moving from one label to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionModel {
    /// Every transition costs nothing.
    #[default]
    Uniform,
    /// `scores[from][to]`, one row and column per label.
    Matrix { scores: Vec<Vec<f32>> },
    /// Labels tend to persist: staying scores `ln(stability)`, switching to
    /// any other label scores `ln((1 - stability) / (labels - 1))`.
    MetaStable { stability: f32 },
}

impl TransitionModel {
    /// Check that the model fits `labels` columns.
    pub fn validate(&self, labels: usize) -> Result<()> {
        match self {
            TransitionModel::Uniform => Ok(()),
            TransitionModel::Matrix { scores } => {
                let square = scores.len() == labels && scores.iter().all(|r| r.len() == labels);
                if !square {
                    return Err(WindvecError::InvalidConfig(format!(
                        "transition matrix must be {labels} x {labels}"
                    )));
                }
                if scores.iter().flatten().any(|v| v.is_nan()) {
                    return Err(WindvecError::InvalidConfig(
                        "transition matrix contains NaN".into(),
                    ));
                }
                Ok(())
            }
            TransitionModel::MetaStable { stability } => {
                if *stability > 0.0 && *stability < 1.0 {
                    Ok(())
                } else {
                    Err(WindvecError::InvalidConfig(format!(
                        "stability {stability} must lie strictly between 0 and 1"
                    )))
                }
            }
        }
    }

    /// Dense `labels x labels` table of additive scores.
    pub fn table(&self, labels: usize) -> Result<Vec<f32>> {
        self.validate(labels)?;
        let table = match self {
            TransitionModel::Uniform => vec![0.0; labels * labels],
            TransitionModel::Matrix { scores } => scores.iter().flatten().copied().collect(),
            TransitionModel::MetaStable { stability } => {
                let stay = stability.ln();
                let switch = if labels > 1 {
                    ((1.0 - stability) / (labels - 1) as f32).ln()
                } else {
                    f32::NEG_INFINITY
                };
                (0..labels * labels)
                    .map(|i| if i / labels == i % labels { stay } else { switch })
                    .collect()
            }
        };
        Ok(table)
    }
}
