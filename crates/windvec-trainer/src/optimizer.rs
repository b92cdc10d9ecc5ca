//! SGD with classical momentum and optional L2 weight decay.

use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use candle_nn::Optimizer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SgdParams {
    pub learning_rate: f64,
    pub momentum: f64,
    /// Added to every gradient as `l2 * w`. Zero disables it.
    pub l2: f64,
}

impl Default for SgdParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            momentum: 0.5,
            l2: 0.0,
        }
    }
}

/// `v = momentum * v - lr * (g + l2 * w); w = w + v`
#[derive(Debug)]
pub struct MomentumSgd {
    vars: Vec<(Var, Var)>,
    params: SgdParams,
}

impl Optimizer for MomentumSgd {
    type Config = SgdParams;

    fn new(vars: Vec<Var>, params: SgdParams) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let velocity = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok((var, velocity))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn learning_rate(&self) -> f64 {
        self.params.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.learning_rate = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let SgdParams {
            learning_rate,
            momentum,
            l2,
        } = self.params;

        for (var, velocity) in &self.vars {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let grad = if l2 > 0.0 {
                grad.add(&var.as_tensor().affine(l2, 0.0)?)?
            } else {
                grad.clone()
            };
            let next = velocity
                .as_tensor()
                .affine(momentum, 0.0)?
                .sub(&grad.affine(learning_rate, 0.0)?)?;
            var.set(&var.as_tensor().add(&next)?)?;
            velocity.set(&next)?;
        }
        Ok(())
    }
}
