//! # Training Coordinator Contract
//!
//! The narrow boundary between the core and whatever backend trains the
//! window classifier. The core hands over a [`NetworkConfig`] and a
//! restartable [`BatchIterator`], and gets back a [`ScoringModel`]. Nothing
//! about layers, transport or replicas crosses this line.

use serde::{Deserialize, Serialize};

use crate::decode::ScoreMatrix;
use crate::error::{Result, WindvecError};

/// A block of feature rows with one class index per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Row-major `rows x columns` features.
    pub features: Vec<f32>,
    pub labels: Vec<usize>,
    columns: usize,
}

impl Batch {
    /// `features.len()` must equal `labels.len() * columns`.
    pub fn new(features: Vec<f32>, labels: Vec<usize>, columns: usize) -> Self {
        debug_assert_eq!(features.len(), labels.len() * columns);
        Self {
            features,
            labels,
            columns,
        }
    }

    pub fn rows(&self) -> usize {
        self.labels.len()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.columns;
        &self.features[start..start + self.columns]
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Restartable stream of training batches.
pub trait BatchIterator {
    /// Next batch, or `None` at the end of a pass.
    fn next_batch(&mut self) -> Option<Batch>;

    /// Rewind to the start. The next pass yields the same batches.
    fn reset(&mut self);

    /// Width of every feature row.
    fn input_columns(&self) -> usize;

    /// Number of label classes.
    fn num_classes(&self) -> usize;
}

/// In-memory batch source, mostly useful for tests and small datasets.
#[derive(Debug, Clone)]
pub struct MemoryBatches {
    batches: Vec<Batch>,
    columns: usize,
    classes: usize,
    cursor: usize,
}

impl MemoryBatches {
    /// # Errors
    ///
    /// `InvalidConfig` if a batch has a different width or a label is out
    /// of range.
    pub fn new(batches: Vec<Batch>, columns: usize, classes: usize) -> Result<Self> {
        for batch in &batches {
            if batch.columns() != columns {
                return Err(WindvecError::InvalidConfig(format!(
                    "batch has {} columns, expected {columns}",
                    batch.columns()
                )));
            }
            if let Some(&label) = batch.labels.iter().find(|&&l| l >= classes) {
                return Err(WindvecError::InvalidConfig(format!(
                    "label {label} out of range for {classes} classes"
                )));
            }
        }
        Ok(Self {
            batches,
            columns,
            classes,
            cursor: 0,
        })
    }
}

impl BatchIterator for MemoryBatches {
    fn next_batch(&mut self) -> Option<Batch> {
        let batch = self.batches.get(self.cursor).cloned();
        if batch.is_some() {
            self.cursor += 1;
        }
        batch
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn input_columns(&self) -> usize {
        self.columns
    }

    fn num_classes(&self) -> usize {
        self.classes
    }
}

/// A trained classifier that scores feature vectors per class.
pub trait ScoringModel {
    fn num_classes(&self) -> usize;

    /// Class probabilities for one feature row.
    fn score(&self, features: &[f32]) -> Result<Vec<f32>>;

    /// Score several rows into a `rows x classes` matrix.
    fn score_rows(&self, rows: &[Vec<f32>]) -> Result<ScoreMatrix> {
        let scored = rows
            .iter()
            .map(|row| self.score(row))
            .collect::<Result<Vec<_>>>()?;
        ScoreMatrix::from_rows(&scored, self.num_classes())
    }
}

/// A backend that trains a [`ScoringModel`] from batches.
///
/// `submit` may block for a long time. Backend failures come back as
/// [`WindvecError::TrainingFailed`]; callers do not retry.
pub trait DistributedTrainer {
    /// Configured, not yet trained, network.
    type Handle;
    type Model: ScoringModel;

    /// Validate `config` and prepare a network.
    fn configure(&self, config: &NetworkConfig) -> Result<Self::Handle>;

    /// Train on every batch of `batches`, rewinding between passes.
    fn submit(&self, handle: Self::Handle, batches: &mut dyn BatchIterator) -> Result<Self::Model>;
}

/// Hidden-layer nonlinearity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    HardTanh,
    Tanh,
    Sigmoid,
    Relu,
}

/// Topology and hyperparameters handed to a [`DistributedTrainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Input width, `D * (2k + 1)` for window features.
    pub n_in: usize,
    /// Number of label classes.
    pub n_out: usize,
    /// Hidden layer widths. Empty means "derive from `n_in`".
    pub hidden_layer_sizes: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    /// Full passes over the batch iterator.
    pub epochs: usize,
    pub momentum: f64,
    pub use_regularization: bool,
    /// L2 penalty, only applied with `use_regularization`.
    pub l2: f64,
    /// Number of parallel replicas.
    pub workers: usize,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            n_in: 0,
            n_out: 0,
            hidden_layer_sizes: Vec::new(),
            activation: Activation::HardTanh,
            learning_rate: 0.05,
            epochs: 20,
            momentum: 0.5,
            use_regularization: false,
            l2: 2e-4,
            workers: 1,
            seed: 42,
        }
    }
}

impl NetworkConfig {
    pub fn with_shape(mut self, n_in: usize, n_out: usize) -> Self {
        self.n_in = n_in;
        self.n_out = n_out;
        self
    }

    pub fn with_hidden_layers(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_layer_sizes = sizes;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_l2(mut self, l2: f64) -> Self {
        self.use_regularization = true;
        self.l2 = l2;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Hidden widths to build. When none are configured this is
    /// `[n_in / 4, n_in / 4, n_in / 3]`, each at least 1.
    pub fn resolved_hidden_layers(&self) -> Vec<usize> {
        if !self.hidden_layer_sizes.is_empty() {
            return self.hidden_layer_sizes.clone();
        }
        [self.n_in / 4, self.n_in / 4, self.n_in / 3]
            .into_iter()
            .map(|n| n.max(1))
            .collect()
    }

    /// # Errors
    ///
    /// `InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(WindvecError::InvalidConfig(msg));
        if self.n_in == 0 {
            return fail("n_in must be positive".into());
        }
        if self.n_out < 2 {
            return fail(format!("n_out must be at least 2, got {}", self.n_out));
        }
        if self.hidden_layer_sizes.contains(&0) {
            return fail("hidden layer sizes must be positive".into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return fail(format!("learning rate {} must be positive", self.learning_rate));
        }
        if self.epochs == 0 {
            return fail("epochs must be positive".into());
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return fail(format!("momentum {} must lie in [0, 1)", self.momentum));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return fail(format!("l2 {} must be non-negative", self.l2));
        }
        if self.workers == 0 {
            return fail("workers must be positive".into());
        }
        Ok(())
    }
}
