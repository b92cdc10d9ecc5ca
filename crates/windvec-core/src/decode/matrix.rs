use crate::error::{Result, WindvecError};

/// Dense `positions x labels` score matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    positions: usize,
    labels: usize,
    data: Vec<f32>,
}

impl ScoreMatrix {
    /// Build from row-major data.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for zero label columns, a length mismatch, or NaN entries.
    pub fn new(positions: usize, labels: usize, data: Vec<f32>) -> Result<Self> {
        if labels == 0 {
            return Err(WindvecError::InvalidConfig(
                "score matrix needs at least one label column".into(),
            ));
        }
        if positions.checked_mul(labels) != Some(data.len()) {
            return Err(WindvecError::InvalidConfig(format!(
                "score matrix has {} values, expected {positions} x {labels}",
                data.len()
            )));
        }
        if data.iter().any(|v| v.is_nan()) {
            return Err(WindvecError::InvalidConfig("score matrix contains NaN".into()));
        }
        Ok(Self {
            positions,
            labels,
            data,
        })
    }

    /// Build from one row per position. An empty slice gives a matrix with
    /// zero positions and `labels` columns.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R], labels: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * labels);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != labels {
                return Err(WindvecError::InvalidConfig(format!(
                    "row {i} has {} scores, expected {labels}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), labels, data)
    }

    pub fn positions(&self) -> usize {
        self.positions
    }

    pub fn labels(&self) -> usize {
        self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.positions == 0
    }

    pub fn row(&self, position: usize) -> &[f32] {
        let start = position * self.labels;
        &self.data[start..start + self.labels]
    }

    pub fn get(&self, position: usize, label: usize) -> f32 {
        self.data[position * self.labels + label]
    }

    /// Natural log of every entry, for turning probabilities into additive
    /// scores. Zero probabilities become `-inf`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if any entry is negative.
    pub fn ln(&self) -> Result<Self> {
        if let Some(bad) = self.data.iter().find(|v| **v < 0.0) {
            return Err(WindvecError::InvalidConfig(format!(
                "cannot take the log of negative score {bad}"
            )));
        }
        Self::new(
            self.positions,
            self.labels,
            self.data.iter().map(|v| v.ln()).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let m = ScoreMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        assert_eq!(m.positions(), 2);
        assert_eq!(m.row(1), &[3.0f32, 4.0]);
        assert_eq!(m.get(0, 1), 2.0);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(ScoreMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]], 2).is_err());
        assert!(ScoreMatrix::new(1, 0, vec![]).is_err());
        assert!(ScoreMatrix::new(1, 2, vec![f32::NAN, 0.0]).is_err());
    }

    #[test]
    fn test_ln_maps_zero_to_neg_infinity() {
        let m = ScoreMatrix::new(1, 2, vec![1.0, 0.0]).unwrap().ln().unwrap();
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(0, 1), f32::NEG_INFINITY);
    }

    #[test]
    fn test_ln_rejects_negative_scores() {
        let m = ScoreMatrix::new(1, 2, vec![-1.0, 0.5]).unwrap();
        assert!(matches!(m.ln(), Err(WindvecError::InvalidConfig(_))));
    }
}
