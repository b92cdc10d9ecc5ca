//! Fully connected classifier used by every replica.

use candle_core::{DType, Device, Module, Result, Tensor, Var};
use candle_nn::Linear;
use oorandom::Rand32;
use windvec_core::{Activation, NetworkConfig};

/// Stack of linear layers with a shared hidden activation. The output layer
/// produces raw logits.
#[derive(Debug)]
pub struct FeedForward {
    layers: Vec<Linear>,
    params: Vec<Var>,
    activation: Activation,
    device: Device,
}

impl FeedForward {
    /// Build `n_in -> hidden... -> n_out` with Xavier-uniform weights drawn
    /// from `config.seed` and zero biases.
    pub fn new(config: &NetworkConfig, device: &Device) -> Result<Self> {
        let mut widths = Vec::with_capacity(config.hidden_layer_sizes.len() + 2);
        widths.push(config.n_in);
        widths.extend(config.resolved_hidden_layers());
        widths.push(config.n_out);

        let mut rng = Rand32::new(config.seed);
        let mut layers = Vec::with_capacity(widths.len() - 1);
        let mut params = Vec::with_capacity(2 * (widths.len() - 1));

        for pair in widths.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
            let values: Vec<f32> = (0..fan_in * fan_out)
                .map(|_| (rng.rand_float() * 2.0 - 1.0) * bound)
                .collect();

            let weight = Var::from_tensor(&Tensor::from_vec(values, (fan_out, fan_in), device)?)?;
            let bias = Var::zeros(fan_out, DType::F32, device)?;
            layers.push(Linear::new(
                weight.as_tensor().clone(),
                Some(bias.as_tensor().clone()),
            ));
            params.push(weight);
            params.push(bias);
        }

        Ok(Self {
            layers,
            params,
            activation: config.activation,
            device: device.clone(),
        })
    }

    /// Logits for a `[rows, n_in]` input.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = activate(self.activation, &x)?;
            }
        }
        Ok(x)
    }

    /// Trainable parameters as `[w0, b0, w1, b1, ...]`.
    pub fn parameters(&self) -> &[Var] {
        &self.params
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Widths of every layer boundary, input first.
    pub fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.params.iter().step_by(2).map(|w| w.dims()[1]).collect();
        if let Some(last) = self.params.last() {
            widths.push(last.dims()[0]);
        }
        widths
    }

    /// Overwrite every parameter with the matching tensor in `values`.
    pub fn load_parameters(&self, values: &[Tensor]) -> Result<()> {
        if values.len() != self.params.len() {
            candle_core::bail!(
                "expected {} parameter tensors, got {}",
                self.params.len(),
                values.len()
            );
        }
        for (param, value) in self.params.iter().zip(values) {
            param.set(value)?;
        }
        Ok(())
    }
}

fn activate(activation: Activation, x: &Tensor) -> Result<Tensor> {
    match activation {
        Activation::HardTanh => x.clamp(-1f32, 1f32),
        Activation::Tanh => x.tanh(),
        Activation::Sigmoid => x.neg()?.exp()?.affine(1.0, 1.0)?.recip(),
        Activation::Relu => x.relu(),
    }
}
