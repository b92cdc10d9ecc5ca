//! # Local Coordinator
//!
//! Runs `workers` replicas of the same network on scoped threads. Each round
//! deals one batch to each replica, trains them in parallel, then averages
//! their parameters and broadcasts the mean back to every replica (iterative
//! reduce). One worker degenerates to plain mini-batch SGD.

use std::thread;

use candle_core::{Device, Tensor};
use candle_nn::Optimizer;
use tracing::{debug, info};
use windvec_core::{
    Batch, BatchIterator, DistributedTrainer, NetworkConfig, Result, ScoreMatrix, ScoringModel,
    WindvecError,
};

use crate::network::FeedForward;
use crate::optimizer::{MomentumSgd, SgdParams};
use crate::training_failed;

/// One network copy with its own optimizer state.
struct Replica {
    network: FeedForward,
    optimizer: MomentumSgd,
}

impl Replica {
    fn new(config: &NetworkConfig, device: &Device) -> candle_core::Result<Self> {
        let network = FeedForward::new(config, device)?;
        let params = SgdParams {
            learning_rate: config.learning_rate,
            momentum: config.momentum,
            l2: if config.use_regularization { config.l2 } else { 0.0 },
        };
        let optimizer = MomentumSgd::new(network.parameters().to_vec(), params)?;
        Ok(Self { network, optimizer })
    }

    /// One optimizer step on `batch`; returns the mean cross-entropy.
    fn train_batch(&mut self, batch: &Batch) -> candle_core::Result<f32> {
        let device = self.network.device();
        let input = Tensor::from_slice(&batch.features, (batch.rows(), batch.columns()), device)?;
        let labels: Vec<u32> = batch.labels.iter().map(|&l| l as u32).collect();
        let targets = Tensor::from_vec(labels, batch.rows(), device)?;

        let logits = self.network.forward(&input)?;
        let loss = candle_nn::loss::cross_entropy(&logits, &targets)?;
        self.optimizer.backward_step(&loss)?;
        loss.to_scalar::<f32>()
    }
}

/// Configured replicas, ready to be submitted.
pub struct NetworkHandle {
    config: NetworkConfig,
    replicas: Vec<Replica>,
}

impl NetworkHandle {
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn replicas(&self) -> usize {
        self.replicas.len()
    }
}

/// In-process parameter-averaging backend.
#[derive(Debug, Clone)]
pub struct LocalCoordinator {
    device: Device,
}

impl Default for LocalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCoordinator {
    /// CPU coordinator.
    pub fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    pub fn with_device(device: Device) -> Self {
        Self { device }
    }
}

impl DistributedTrainer for LocalCoordinator {
    type Handle = NetworkHandle;
    type Model = TrainedNetwork;

    fn configure(&self, config: &NetworkConfig) -> Result<NetworkHandle> {
        config.validate()?;
        let replicas = (0..config.workers)
            .map(|_| Replica::new(config, &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(training_failed)?;
        debug!(
            replicas = replicas.len(),
            layers = ?config.resolved_hidden_layers(),
            "configured network replicas"
        );
        Ok(NetworkHandle {
            config: config.clone(),
            replicas,
        })
    }

    fn submit(
        &self,
        handle: NetworkHandle,
        batches: &mut dyn BatchIterator,
    ) -> Result<TrainedNetwork> {
        let NetworkHandle {
            config,
            mut replicas,
        } = handle;

        if batches.input_columns() != config.n_in || batches.num_classes() != config.n_out {
            return Err(WindvecError::InvalidConfig(format!(
                "batches are {} -> {}, network is {} -> {}",
                batches.input_columns(),
                batches.num_classes(),
                config.n_in,
                config.n_out
            )));
        }

        let mut losses = Vec::with_capacity(config.epochs);
        for epoch in 0..config.epochs {
            batches.reset();
            let mut loss_sum = 0.0f64;
            let mut steps = 0usize;
            let mut rounds = 0usize;

            loop {
                let round: Vec<Batch> = std::iter::from_fn(|| batches.next_batch())
                    .take(replicas.len())
                    .collect();
                if round.is_empty() {
                    break;
                }
                for batch in &round {
                    check_batch(batch, &config)?;
                }

                let round_losses = train_round(&mut replicas[..round.len()], &round)?;
                average_parameters(&replicas, round.len()).map_err(training_failed)?;

                loss_sum += round_losses.iter().map(|&l| l as f64).sum::<f64>();
                steps += round_losses.len();
                rounds += 1;
            }

            if steps == 0 {
                return Err(WindvecError::EmptyInput(
                    "batch iterator yielded no samples".into(),
                ));
            }
            let loss = loss_sum / steps as f64;
            info!(
                epoch = epoch + 1,
                epochs = config.epochs,
                loss,
                rounds,
                "classifier epoch complete"
            );
            losses.push(loss);
        }

        let network = replicas
            .into_iter()
            .next()
            .map(|r| r.network)
            .ok_or_else(|| WindvecError::InvalidConfig("no replicas configured".into()))?;
        Ok(TrainedNetwork {
            network,
            classes: config.n_out,
            losses,
        })
    }
}

fn check_batch(batch: &Batch, config: &NetworkConfig) -> Result<()> {
    if batch.columns() != config.n_in {
        return Err(WindvecError::InvalidConfig(format!(
            "batch has {} columns, network expects {}",
            batch.columns(),
            config.n_in
        )));
    }
    if let Some(&label) = batch.labels.iter().find(|&&l| l >= config.n_out) {
        return Err(WindvecError::label_not_found(label.to_string()));
    }
    Ok(())
}

/// Train `replicas[i]` on `round[i]` in parallel.
fn train_round(replicas: &mut [Replica], round: &[Batch]) -> Result<Vec<f32>> {
    if let ([replica], [batch]) = (&mut *replicas, round) {
        return replica.train_batch(batch).map(|l| vec![l]).map_err(training_failed);
    }

    thread::scope(|scope| {
        let workers: Vec<_> = replicas
            .iter_mut()
            .zip(round)
            .map(|(replica, batch)| scope.spawn(move || replica.train_batch(batch)))
            .collect();

        workers
            .into_iter()
            .map(|worker| match worker.join() {
                Ok(result) => result.map_err(training_failed),
                Err(_) => Err(WindvecError::training_failed("replica worker panicked")),
            })
            .collect()
    })
}

/// Average the parameters of the first `trained` replicas and broadcast the
/// mean to all of them.
fn average_parameters(replicas: &[Replica], trained: usize) -> candle_core::Result<()> {
    if replicas.len() < 2 {
        return Ok(());
    }
    let scale = 1.0 / trained as f64;
    let params = replicas[0].network.parameters().len();

    let mut means = Vec::with_capacity(params);
    for p in 0..params {
        let mut sum = replicas[0].network.parameters()[p].as_tensor().clone();
        for replica in &replicas[1..trained] {
            sum = sum.add(replica.network.parameters()[p].as_tensor())?;
        }
        means.push(sum.affine(scale, 0.0)?);
    }
    for replica in replicas {
        replica.network.load_parameters(&means)?;
    }
    Ok(())
}

/// The averaged network, scoring with softmax probabilities.
#[derive(Debug)]
pub struct TrainedNetwork {
    network: FeedForward,
    classes: usize,
    losses: Vec<f64>,
}

impl TrainedNetwork {
    /// Mean training loss per epoch.
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    pub fn network(&self) -> &FeedForward {
        &self.network
    }

    fn probabilities(&self, features: &[f32], rows: usize) -> candle_core::Result<Vec<Vec<f32>>> {
        let columns = if rows == 0 { 0 } else { features.len() / rows };
        let input = Tensor::from_slice(features, (rows, columns), self.network.device())?;
        let logits = self.network.forward(&input)?;
        candle_nn::ops::softmax_last_dim(&logits)?.to_vec2()
    }
}

impl ScoringModel for TrainedNetwork {
    fn num_classes(&self) -> usize {
        self.classes
    }

    fn score(&self, features: &[f32]) -> Result<Vec<f32>> {
        self.probabilities(features, 1)
            .map_err(training_failed)?
            .pop()
            .ok_or_else(|| WindvecError::EmptyInput("no scores produced".into()))
    }

    fn score_rows(&self, rows: &[Vec<f32>]) -> Result<ScoreMatrix> {
        if rows.is_empty() {
            return ScoreMatrix::from_rows(rows, self.classes);
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let scored = self
            .probabilities(&flat, rows.len())
            .map_err(training_failed)?;
        ScoreMatrix::from_rows(&scored, self.classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windvec_core::MemoryBatches;

    /// Two separable classes: class 0 has mass on the first feature, class 1
    /// on the second.
    fn batches(count: usize) -> MemoryBatches {
        let batches = (0..count)
            .map(|i| {
                let shift = (i % 3) as f32 * 0.1;
                Batch::new(
                    vec![1.0, shift, 0.0, shift, 1.0, 0.0, 0.9, 0.0, shift, 0.0, 0.8, shift],
                    vec![0, 1, 0, 1],
                    3,
                )
            })
            .collect();
        MemoryBatches::new(batches, 3, 2).unwrap()
    }

    fn config(workers: usize) -> NetworkConfig {
        NetworkConfig::default()
            .with_shape(3, 2)
            .with_hidden_layers(vec![8])
            .with_activation(windvec_core::Activation::Tanh)
            .with_learning_rate(0.1)
            .with_epochs(40)
            .with_workers(workers)
    }

    fn train(workers: usize) -> TrainedNetwork {
        let coordinator = LocalCoordinator::new();
        let handle = coordinator.configure(&config(workers)).unwrap();
        coordinator.submit(handle, &mut batches(6)).unwrap()
    }

    #[test]
    fn test_single_worker_learns() {
        let model = train(1);
        let losses = model.losses();
        assert_eq!(losses.len(), 40);
        assert!(losses[39] < losses[0]);

        let p0 = model.score(&[1.0, 0.0, 0.0]).unwrap();
        let p1 = model.score(&[0.0, 1.0, 0.0]).unwrap();
        assert!(p0[0] > p0[1]);
        assert!(p1[1] > p1[0]);
        assert!((p0.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_parameter_averaging_learns() {
        let model = train(3);
        assert!(model.losses()[39] < model.losses()[0]);
        let p1 = model.score(&[0.0, 1.0, 0.0]).unwrap();
        assert!(p1[1] > p1[0]);
    }

    #[test]
    fn test_replicas_stay_in_sync() {
        let coordinator = LocalCoordinator::new();
        let mut handle = coordinator.configure(&config(2)).unwrap();
        let round = vec![
            Batch::new(vec![1.0, 0.0, 0.0], vec![0], 3),
            Batch::new(vec![0.0, 1.0, 0.0], vec![1], 3),
        ];
        train_round(&mut handle.replicas, &round).unwrap();
        average_parameters(&handle.replicas, 2).unwrap();

        for (a, b) in handle.replicas[0]
            .network
            .parameters()
            .iter()
            .zip(handle.replicas[1].network.parameters())
        {
            let a: Vec<f32> = a.as_tensor().flatten_all().unwrap().to_vec1().unwrap();
            let b: Vec<f32> = b.as_tensor().flatten_all().unwrap().to_vec1().unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_single_worker_is_deterministic() {
        let a = train(1);
        let b = train(1);
        let x = [0.3, 0.6, 0.1];
        assert_eq!(a.score(&x).unwrap(), b.score(&x).unwrap());
    }

    #[test]
    fn test_score_rows_matches_score() {
        let model = train(1);
        let rows = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        let matrix = model.score_rows(&rows).unwrap();
        assert_eq!(matrix.positions(), 2);
        for (i, row) in rows.iter().enumerate() {
            let single = model.score(row).unwrap();
            for (a, b) in matrix.row(i).iter().zip(&single) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let coordinator = LocalCoordinator::new();
        let handle = coordinator
            .configure(&config(1).with_shape(4, 2))
            .unwrap();
        assert!(matches!(
            coordinator.submit(handle, &mut batches(1)),
            Err(WindvecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_iterator() {
        let coordinator = LocalCoordinator::new();
        let handle = coordinator.configure(&config(2)).unwrap();
        let mut empty = MemoryBatches::new(Vec::new(), 3, 2).unwrap();
        assert!(matches!(
            coordinator.submit(handle, &mut empty),
            Err(WindvecError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected_on_configure() {
        let coordinator = LocalCoordinator::new();
        assert!(matches!(
            coordinator.configure(&config(1).with_epochs(0)),
            Err(WindvecError::InvalidConfig(_))
        ));
    }
}
