//! Adadelta optimizer.
//!
//! Adadelta adapts per-element step sizes from a moving window of past gradients
//! and past updates, so it keeps making progress when plain learning-rate decay
//! would have stalled. The update rule is:
//!
//! ```text
//! E[g²]  = ρ · E[g²]  + (1 - ρ) · g²
//! Δx     = -√(E[Δx²] + ε) / √(E[g²] + ε) · g
//! E[Δx²] = ρ · E[Δx²] + (1 - ρ) · Δx²
//! x      = x + lr · Δx
//! ```
//!
//! Zeiler, M. D. (2012). ADADELTA: An adaptive learning rate method.
//! arXiv preprint arXiv:1212.5701.

use std::collections::{HashMap, HashSet};

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use regex::Regex;
use tracing::trace;

use super::clipping::GradientClipping;
use super::variable::Trainable;
use super::{GradientPair, Optimizer};
use crate::error::{NnError, Result};

/// Configuration for [`Adadelta`].
#[derive(Config, Debug)]
pub struct AdadeltaConfig {
    #[config(default = 0.001)]
    pub learning_rate: f64,
    /// Decay rate of both moving averages.
    #[config(default = 0.95)]
    pub rho: f64,
    #[config(default = 1e-7)]
    pub epsilon: f64,
    /// Decoupled weight decay, scaled by the learning rate.
    pub weight_decay: Option<f64>,
    /// Per-gradient L2 norm clipping.
    pub clipnorm: Option<f64>,
    /// Element-wise value clipping.
    pub clipvalue: Option<f64>,
    /// Joint L2 norm clipping over all gradients of a step.
    pub global_clipnorm: Option<f64>,
}

impl AdadeltaConfig {
    pub fn init<B: Backend>(&self) -> Result<Adadelta<B>> {
        if !(0.0..=1.0).contains(&self.rho) {
            return Err(NnError::configuration(format!(
                "`rho` must be in [0, 1], received {}",
                self.rho
            )));
        }
        if self.epsilon < 0.0 {
            return Err(NnError::configuration(format!(
                "`epsilon` must be non-negative, received {}",
                self.epsilon
            )));
        }
        if let Some(weight_decay) = self.weight_decay {
            if weight_decay < 0.0 {
                return Err(NnError::configuration(format!(
                    "`weight_decay` must be non-negative, received {weight_decay}"
                )));
            }
        }
        let clipping =
            GradientClipping::from_options(self.clipnorm, self.clipvalue, self.global_clipnorm)?;

        Ok(Adadelta {
            learning_rate: self.learning_rate,
            rho: self.rho,
            epsilon: self.epsilon,
            weight_decay: self.weight_decay,
            clipping,
            iterations: 0,
            slots: HashMap::new(),
            excluded_ids: HashSet::new(),
            excluded_patterns: Vec::new(),
        })
    }
}

/// Moving averages kept per variable, stored flattened.
#[derive(Debug, Clone)]
struct AdadeltaSlots<B: Backend> {
    accumulated_grad: Tensor<B, 1>,
    accumulated_delta_var: Tensor<B, 1>,
}

impl<B: Backend> AdadeltaSlots<B> {
    fn zeros(num_elements: usize, device: &B::Device) -> Self {
        Self {
            accumulated_grad: Tensor::zeros([num_elements], device),
            accumulated_delta_var: Tensor::zeros([num_elements], device),
        }
    }

    fn num_elements(&self) -> usize {
        self.accumulated_grad.dims()[0]
    }
}

/// Adadelta optimizer over [`Variable`](super::Variable)s.
#[derive(Debug)]
pub struct Adadelta<B: Backend> {
    learning_rate: f64,
    rho: f64,
    epsilon: f64,
    weight_decay: Option<f64>,
    clipping: GradientClipping,
    iterations: u64,
    /// Keyed by [`Trainable::id`].
    slots: HashMap<u64, AdadeltaSlots<B>>,
    excluded_ids: HashSet<u64>,
    excluded_patterns: Vec<Regex>,
}

impl<B: Backend> Adadelta<B> {
    /// Adadelta with default hyper-parameters and the given learning rate.
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            rho: 0.95,
            epsilon: 1e-7,
            weight_decay: None,
            clipping: GradientClipping::None,
            iterations: 0,
            slots: HashMap::new(),
            excluded_ids: HashSet::new(),
            excluded_patterns: Vec::new(),
        }
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn weight_decay(&self) -> Option<f64> {
        self.weight_decay
    }

    pub fn clipping(&self) -> GradientClipping {
        self.clipping
    }

    /// The config this optimizer was built from.
    pub fn config(&self) -> AdadeltaConfig {
        let (clipnorm, clipvalue, global_clipnorm) = match self.clipping {
            GradientClipping::None => (None, None, None),
            GradientClipping::Norm(norm) => (Some(norm), None, None),
            GradientClipping::Value(value) => (None, Some(value), None),
            GradientClipping::GlobalNorm(norm) => (None, None, Some(norm)),
        };
        AdadeltaConfig::new()
            .with_learning_rate(self.learning_rate)
            .with_rho(self.rho)
            .with_epsilon(self.epsilon)
            .with_weight_decay(self.weight_decay)
            .with_clipnorm(clipnorm)
            .with_clipvalue(clipvalue)
            .with_global_clipnorm(global_clipnorm)
    }

    /// Skip weight decay for variables whose name matches any of the regular
    /// expressions in `var_names`.
    pub fn exclude_from_weight_decay(&mut self, var_names: &[&str]) -> Result<()> {
        for pattern in var_names {
            let regex = Regex::new(pattern).map_err(|err| {
                NnError::configuration(format!("invalid variable name pattern '{pattern}': {err}"))
            })?;
            self.excluded_patterns.push(regex);
        }
        Ok(())
    }

    /// Skip weight decay for one specific variable.
    pub fn exclude_variable_from_weight_decay(&mut self, variable: &dyn Trainable<B>) {
        self.excluded_ids.insert(variable.id());
    }

    /// The `(E[g²], E[Δx²])` moving averages of a variable, flattened, or
    /// `None` before its first update.
    pub fn accumulators(&self, variable: &dyn Trainable<B>) -> Option<(Tensor<B, 1>, Tensor<B, 1>)> {
        self.slots.get(&variable.id()).map(|slots| {
            (
                slots.accumulated_grad.clone(),
                slots.accumulated_delta_var.clone(),
            )
        })
    }

    fn uses_weight_decay(&self, variable: &dyn Trainable<B>) -> bool {
        !self.excluded_ids.contains(&variable.id())
            && !self
                .excluded_patterns
                .iter()
                .any(|pattern| pattern.is_match(variable.name()))
    }

    pub fn clip_gradients<const D: usize>(&self, gradients: Vec<Tensor<B, D>>) -> Vec<Tensor<B, D>> {
        self.clipping.clip(gradients)
    }

    fn update_step(&mut self, grad: Tensor<B, 1>, variable: &mut dyn Trainable<B>) {
        let [num_elements] = grad.dims();
        let device = grad.device();
        let (rho, epsilon, learning_rate) = (self.rho, self.epsilon, self.learning_rate);

        let slots = self
            .slots
            .entry(variable.id())
            .or_insert_with(|| AdadeltaSlots::zeros(num_elements, &device));
        if slots.num_elements() != num_elements {
            *slots = AdadeltaSlots::zeros(num_elements, &device);
        }

        let accumulated_grad =
            slots.accumulated_grad.clone() * rho + grad.clone().powf_scalar(2.0) * (1.0 - rho);
        let delta_var = ((slots.accumulated_delta_var.clone() + epsilon).sqrt()
            / (accumulated_grad.clone() + epsilon).sqrt()
            * grad)
            .neg();
        let accumulated_delta_var = slots.accumulated_delta_var.clone() * rho
            + delta_var.clone().powf_scalar(2.0) * (1.0 - rho);

        slots.accumulated_grad = accumulated_grad;
        slots.accumulated_delta_var = accumulated_delta_var;

        let updated = variable.flat_value() + delta_var * learning_rate;
        variable.assign_flat(updated);
    }
}

impl<B: Backend> Optimizer<B> for Adadelta<B> {
    fn apply_gradients<'a, I>(&mut self, grads_and_vars: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<GradientPair<'a, B>>,
    {
        let pairs: Vec<GradientPair<'a, B>> = grads_and_vars.into_iter().map(Into::into).collect();
        for (index, pair) in pairs.iter().enumerate() {
            let expected = pair.variable().shape();
            if pair.shape() != expected.as_slice() {
                return Err(NnError::shape_mismatch(
                    format!("gradient {index} for variable '{}'", pair.variable().name()),
                    expected,
                    pair.shape().to_vec(),
                ));
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }

        let num_variables = pairs.len();
        let (gradients, mut variables): (Vec<_>, Vec<_>) =
            pairs.into_iter().map(GradientPair::into_parts).unzip();
        // Flattening keeps per-gradient and global norms unchanged.
        let gradients = self.clip_gradients(gradients);

        if let Some(weight_decay) = self.weight_decay {
            let factor = weight_decay * self.learning_rate;
            for variable in variables.iter_mut() {
                if self.uses_weight_decay(&**variable) {
                    let value = variable.flat_value();
                    variable.assign_flat(value.clone() - value * factor);
                }
            }
        }

        for (gradient, variable) in gradients.into_iter().zip(variables) {
            self.update_step(gradient, variable);
        }
        self.iterations += 1;
        trace!(iteration = self.iterations, num_variables, "applied adadelta step");
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}
