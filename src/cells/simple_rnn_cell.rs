//! Fully-connected recurrent cell.

use burn::config::Config;
use burn::module::{Ignored, Module, Param};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::{CellState, RecurrentCell, StateSize};
use crate::activation::Activation;

/// Configuration for [`SimpleRnnCell`].
#[derive(Config, Debug)]
pub struct SimpleRnnCellConfig {
    /// Width of the input feature vector.
    pub input_size: usize,
    /// Number of units, which is both the output and the state width.
    pub units: usize,
    #[config(default = "Activation::Tanh")]
    pub activation: Activation,
    #[config(default = true)]
    pub use_bias: bool,
    #[config(default = "Initializer::XavierUniform{gain:1.0}")]
    pub kernel_initializer: Initializer,
    #[config(default = "Initializer::XavierUniform{gain:1.0}")]
    pub recurrent_initializer: Initializer,
    #[config(default = "Initializer::Zeros")]
    pub bias_initializer: Initializer,
}

impl SimpleRnnCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SimpleRnnCell<B> {
        let kernel = self.kernel_initializer.init_with(
            [self.input_size, self.units],
            Some(self.input_size),
            Some(self.units),
            device,
        );
        let recurrent_kernel = self.recurrent_initializer.init_with(
            [self.units, self.units],
            Some(self.units),
            Some(self.units),
            device,
        );
        let bias = self
            .use_bias
            .then(|| self.bias_initializer.init([self.units], device));

        SimpleRnnCell {
            input_size: self.input_size,
            units: self.units,
            activation: Ignored(self.activation),
            kernel,
            recurrent_kernel,
            bias,
        }
    }
}

/// Single-state cell computing `h' = act(x·K + h·R + b)`.
///
/// The output and the new state are the same tensor.
#[derive(Module, Debug)]
pub struct SimpleRnnCell<B: Backend> {
    input_size: usize,
    units: usize,
    activation: Ignored<Activation>,
    /// `[input_size, units]`
    kernel: Param<Tensor<B, 2>>,
    /// `[units, units]`
    recurrent_kernel: Param<Tensor<B, 2>>,
    bias: Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> SimpleRnnCell<B> {
    /// Create a tanh cell with default initializers.
    ///
    /// # Arguments
    /// * `input_size` - Size of the input features
    /// * `units` - Size of the output and of the hidden state
    /// * `device` - Device to create the module on
    ///
    /// # Returns
    /// A new SimpleRnnCell with Xavier-initialized kernels and a zero bias
    pub fn new(input_size: usize, units: usize, device: &B::Device) -> Self {
        SimpleRnnCellConfig::new(input_size, units).init(device)
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn activation(&self) -> Activation {
        self.activation.0
    }
}

impl<B: Backend> RecurrentCell<B> for SimpleRnnCell<B> {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.units
    }

    fn state_size(&self) -> StateSize {
        StateSize::Single(self.units)
    }

    fn step(&self, input: Tensor<B, 2>, state: CellState<B>) -> (Tensor<B, 2>, CellState<B>) {
        let [batch_size, _] = input.dims();
        let device = input.device();
        let prev = state
            .into_primary()
            .unwrap_or_else(|| Tensor::zeros([batch_size, self.units], &device));

        let mut z = input.matmul(self.kernel.val()) + prev.matmul(self.recurrent_kernel.val());
        if let Some(bias) = &self.bias {
            z = z + bias.val().unsqueeze::<2>();
        }
        let output = self.activation.0.apply(z);

        (output.clone(), CellState::Single(output))
    }
}
