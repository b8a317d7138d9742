//! Activation functions used by the recurrent cells.
//!
//! Burn ships the standard element-wise activations; this module adds the
//! serializable [`Activation`] selector used in cell configs and LeCun's scaled tanh.

use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// Element-wise activation applied by a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Identity.
    Linear,
    #[default]
    Tanh,
    Sigmoid,
    Relu,
    /// `1.7159 * tanh(0.666 * x)`, see [`LeCun`].
    LecunTanh,
}

impl Activation {
    /// Look up an activation by its config name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "linear" => Ok(Self::Linear),
            "tanh" => Ok(Self::Tanh),
            "sigmoid" => Ok(Self::Sigmoid),
            "relu" => Ok(Self::Relu),
            "lecun_tanh" => Ok(Self::LecunTanh),
            other => Err(NnError::configuration(format!(
                "unknown activation '{other}', expected one of \
                 [linear, tanh, sigmoid, relu, lecun_tanh]"
            ))),
        }
    }

    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Linear => x,
            Self::Tanh => x.tanh(),
            Self::Sigmoid => activation::sigmoid(x),
            Self::Relu => activation::relu(x),
            Self::LecunTanh => LeCun::forward(x),
        }
    }
}

/// LeCun's tanh activation function.
///
/// `f(x) = 1.7159 * tanh(0.666 * x)`
///
/// The scaling keeps the function close to the identity near the origin while
/// bounding the output to roughly `[-1.7159, 1.7159]`.
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use cellstack::activation::LeCun;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let x = Tensor::<Backend, 1>::from_floats([0.0, 1.0, -1.0], &device);
/// let y = LeCun::forward(x);
/// ```
pub struct LeCun;

impl LeCun {
    pub fn forward<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
        let scaled = x * 0.666f32;
        scaled.tanh() * 1.7159f32
    }
}

/// Extension trait for applying [`LeCun`] directly on tensors.
pub trait LeCunActivation {
    fn lecun(self) -> Self;
}

impl<B: Backend, const D: usize> LeCunActivation for Tensor<B, D> {
    fn lecun(self) -> Self {
        LeCun::forward(self)
    }
}
