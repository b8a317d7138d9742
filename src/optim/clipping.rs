//! Gradient clipping shared by the optimizers.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use crate::error::{NnError, Result};

/// How gradients are clipped before an update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GradientClipping {
    #[default]
    None,
    /// Rescale each gradient so its L2 norm is at most the threshold.
    Norm(f64),
    /// Clamp every element into `[-threshold, threshold]`.
    Value(f64),
    /// Rescale all gradients of a step so their joint L2 norm is at most the threshold.
    GlobalNorm(f64),
}

impl GradientClipping {
    /// Build from the optional optimizer settings; at most one may be set.
    pub fn from_options(
        clipnorm: Option<f64>,
        clipvalue: Option<f64>,
        global_clipnorm: Option<f64>,
    ) -> Result<Self> {
        let clipping = match (clipnorm, clipvalue, global_clipnorm) {
            (None, None, None) => Self::None,
            (Some(norm), None, None) => Self::Norm(norm),
            (None, Some(value), None) => Self::Value(value),
            (None, None, Some(norm)) => Self::GlobalNorm(norm),
            _ => {
                return Err(NnError::configuration(
                    "only one of `clipnorm`, `clipvalue` and `global_clipnorm` can be set",
                ))
            }
        };
        if let Self::Norm(threshold) | Self::Value(threshold) | Self::GlobalNorm(threshold) =
            clipping
        {
            if threshold.is_nan() || threshold <= 0.0 {
                return Err(NnError::configuration(format!(
                    "clipping threshold must be positive, received {threshold}"
                )));
            }
        }
        Ok(clipping)
    }

    pub fn clip<B: Backend, const D: usize>(&self, gradients: Vec<Tensor<B, D>>) -> Vec<Tensor<B, D>> {
        match *self {
            Self::None => gradients,
            Self::Norm(clip_norm) => gradients
                .into_iter()
                .map(|grad| {
                    let norm = l2_norm(&grad);
                    grad * (clip_norm / norm.max(clip_norm))
                })
                .collect(),
            Self::Value(clip_value) => gradients
                .into_iter()
                .map(|grad| grad.clamp(-clip_value, clip_value))
                .collect(),
            Self::GlobalNorm(clip_norm) => {
                let global = gradients
                    .iter()
                    .map(|grad| {
                        let norm = l2_norm(grad);
                        norm * norm
                    })
                    .sum::<f64>()
                    .sqrt();
                let scale = clip_norm / global.max(clip_norm);
                gradients.into_iter().map(|grad| grad * scale).collect()
            }
        }
    }
}

/// L2 norm of a tensor as a host scalar.
pub fn l2_norm<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> f64 {
    let squared: f64 = tensor.clone().powf_scalar(2.0).sum().into_scalar().elem();
    squared.sqrt()
}
