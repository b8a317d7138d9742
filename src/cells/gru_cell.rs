use burn::config::Config;
use burn::module::{Ignored, Module, Param};
use burn::nn::Initializer;
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::{CellState, RecurrentCell, StateSize};
use crate::activation::Activation;

/// Configuration for [`GruCell`].
#[derive(Config, Debug)]
pub struct GruCellConfig {
    pub input_size: usize,
    pub units: usize,
    /// Applied to the candidate state.
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

impl GruCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GruCell<B> {
        let gates = 3 * self.units;
        let kernel = self.kernel_initializer.init_with(
            [self.input_size, gates],
            Some(self.input_size),
            Some(gates),
            device,
        );
        let recurrent_kernel = self.recurrent_initializer.init_with(
            [self.units, gates],
            Some(self.units),
            Some(gates),
            device,
        );
        let input_bias = self
            .use_bias
            .then(|| self.bias_initializer.init([gates], device));
        let recurrent_bias = self
            .use_bias
            .then(|| self.bias_initializer.init([gates], device));

        GruCell {
            input_size: self.input_size,
            units: self.units,
            activation: Ignored(self.activation),
            kernel,
            recurrent_kernel,
            input_bias,
            recurrent_bias,
        }
    }
}

/// Gated recurrent unit.
///
/// The reset gate is applied after the recurrent matmul:
/// - z = σ(x·K_z + h·R_z)
/// - r = σ(x·K_r + h·R_r)
/// - ĥ = act(x·K_h + r ⊙ (h·R_h))
/// - h' = z ⊙ h + (1 - z) ⊙ ĥ
///
/// Gate blocks are laid out `[z | r | h]` along the last axis of the kernels.
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    input_size: usize,
    units: usize,
    activation: Ignored<Activation>,
    kernel: Param<Tensor<B, 2>>,
    recurrent_kernel: Param<Tensor<B, 2>>,
    input_bias: Option<Param<Tensor<B, 1>>>,
    recurrent_bias: Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> GruCell<B> {
    /// Create a GRU cell with default initializers.
    ///
    /// # Arguments
    /// * `input_size` - Size of the input features
    /// * `units` - Size of the hidden state
    /// * `device` - Device to create the module on
    pub fn new(input_size: usize, units: usize, device: &B::Device) -> Self {
        GruCellConfig::new(input_size, units).init(device)
    }

    pub fn units(&self) -> usize {
        self.units
    }
}

impl<B: Backend> RecurrentCell<B> for GruCell<B> {
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

        let mut matrix_x = input.matmul(self.kernel.val());
        if let Some(bias) = &self.input_bias {
            matrix_x = matrix_x + bias.val().unsqueeze::<2>();
        }
        let mut matrix_inner = prev.clone().matmul(self.recurrent_kernel.val());
        if let Some(bias) = &self.recurrent_bias {
            matrix_inner = matrix_inner + bias.val().unsqueeze::<2>();
        }

        let x_chunks = matrix_x.chunk(3, 1);
        let inner_chunks = matrix_inner.chunk(3, 1);

        let update_gate = activation::sigmoid(x_chunks[0].clone() + inner_chunks[0].clone());
        let reset_gate = activation::sigmoid(x_chunks[1].clone() + inner_chunks[1].clone());
        let candidate = self
            .activation
            .0
            .apply(x_chunks[2].clone() + reset_gate * inner_chunks[2].clone());

        let keep = update_gate.clone();
        let new_hidden = keep * prev + (update_gate.neg() + 1.0) * candidate;

        (new_hidden.clone(), CellState::Single(new_hidden))
    }
}
