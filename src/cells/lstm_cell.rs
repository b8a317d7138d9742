use burn::config::Config;
use burn::module::{Ignored, Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::{CellState, RecurrentCell, StateSize};
use crate::activation::Activation;

/// Configuration for [`LstmCell`].
#[derive(Config, Debug)]
pub struct LstmCellConfig {
    pub input_size: usize,
    pub units: usize,
    /// Applied to the candidate and to the cell state before the output gate.
    #[config(default = "Activation::Tanh")]
    pub activation: Activation,
    /// Initializes the forget gate bias to 1; the other gate biases start at 0.
    #[config(default = true)]
    pub unit_forget_bias: bool,
    #[config(default = "Initializer::XavierUniform{gain:1.0}")]
    pub kernel_initializer: Initializer,
    #[config(default = "Initializer::XavierUniform{gain:1.0}")]
    pub recurrent_initializer: Initializer,
}

impl LstmCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmCell<B> {
        let mut input_map = LinearConfig::new(self.input_size, 4 * self.units)
            .with_bias(true)
            .with_initializer(self.kernel_initializer.clone())
            .init(device);

        // Gate blocks are ordered [input, forget, candidate, output].
        let mut bias = Tensor::zeros([4 * self.units], device);
        if self.unit_forget_bias {
            bias = bias.slice_assign(
                [self.units..2 * self.units],
                Tensor::ones([self.units], device),
            );
        }
        input_map.bias = Some(Param::from_tensor(bias));

        let recurrent_map = LinearConfig::new(self.units, 4 * self.units)
            .with_bias(false)
            .with_initializer(self.recurrent_initializer.clone())
            .init(device);

        LstmCell {
            input_size: self.input_size,
            units: self.units,
            activation: Ignored(self.activation),
            input_map,
            recurrent_map,
        }
    }
}

/// Standard LSTM cell with a two-entry `(h, c)` state.
///
/// - i = σ(W_i x + U_i h + b_i)
/// - f = σ(W_f x + U_f h + b_f)
/// - g = act(W_g x + U_g h + b_g)
/// - o = σ(W_o x + U_o h + b_o)
/// - c' = f ⊙ c + i ⊙ g
/// - h' = o ⊙ act(c')
///
/// The output is `h'`. With `unit_forget_bias`, `b_f` starts at 1 and is
/// trained like any other bias.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    input_size: usize,
    units: usize,
    activation: Ignored<Activation>,
    input_map: Linear<B>,     // input -> 4 * units (with bias)
    recurrent_map: Linear<B>, // hidden -> 4 * units (no bias)
}

impl<B: Backend> LstmCell<B> {
    /// Create an LSTM cell with a unit forget bias.
    ///
    /// # Arguments
    /// * `input_size` - Size of the input features
    /// * `units` - Size of both the hidden and the cell state
    /// * `device` - Device to create the module on
    pub fn new(input_size: usize, units: usize, device: &B::Device) -> Self {
        LstmCellConfig::new(input_size, units).init(device)
    }

    pub fn units(&self) -> usize {
        self.units
    }

    /// Run one step on explicit `(hidden, cell)` tensors.
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
        states: (Tensor<B, 2>, Tensor<B, 2>),
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (hidden_state, cell_state) = states;

        let z = self.input_map.forward(input) + self.recurrent_map.forward(hidden_state);

        let chunks = z.chunk(4, 1);
        let input_gate = activation::sigmoid(chunks[0].clone());
        let forget_gate = activation::sigmoid(chunks[1].clone());
        let candidate = self.activation.0.apply(chunks[2].clone());
        let output_gate = activation::sigmoid(chunks[3].clone());

        let new_cell = cell_state * forget_gate + input_gate * candidate;
        let new_hidden = self.activation.0.apply(new_cell.clone()) * output_gate;

        (new_hidden, new_cell)
    }
}

impl<B: Backend> RecurrentCell<B> for LstmCell<B> {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.units
    }

    fn state_size(&self) -> StateSize {
        StateSize::Multi(vec![self.units, self.units])
    }

    fn step(&self, input: Tensor<B, 2>, state: CellState<B>) -> (Tensor<B, 2>, CellState<B>) {
        let [batch_size, _] = input.dims();
        let device = input.device();
        let mut tensors = state.into_tensors().into_iter();
        let hidden = tensors
            .next()
            .unwrap_or_else(|| Tensor::zeros([batch_size, self.units], &device));
        let cell = tensors
            .next()
            .unwrap_or_else(|| Tensor::zeros([batch_size, self.units], &device));

        let (new_hidden, new_cell) = self.forward(input, (hidden, cell));
        (new_hidden.clone(), CellState::Multi(vec![new_hidden, new_cell]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_lstm_cell_creation() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(20, 50, &device);

        assert_eq!(cell.input_size(), 20);
        assert_eq!(cell.units(), 50);
        assert_eq!(cell.state_size(), StateSize::Multi(vec![50, 50]));
    }

    fn bias_values(cell: &LstmCell<TestBackend>) -> Vec<f32> {
        cell.input_map
            .bias
            .as_ref()
            .map(|bias| bias.val().into_data().to_vec::<f32>().unwrap())
            .unwrap_or_default()
    }

    #[test]
    fn test_unit_forget_bias_lives_in_the_bias_parameter() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(3, 2, &device);

        assert_eq!(bias_values(&cell), vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

        let plain = LstmCellConfig::new(3, 2)
            .with_unit_forget_bias(false)
            .init::<TestBackend>(&device);
        assert_eq!(bias_values(&plain), vec![0.0; 8]);
    }

    #[test]
    fn test_forget_gate_follows_bias_parameter() {
        let device = Default::default();
        let mut cell = LstmCellConfig::new(1, 1)
            .with_kernel_initializer(Initializer::Zeros)
            .with_recurrent_initializer(Initializer::Zeros)
            .init::<TestBackend>(&device);
        // zero the forget bias as training might
        cell.input_map.bias = Some(Param::from_tensor(Tensor::zeros([4], &device)));

        let input = Tensor::<TestBackend, 2>::zeros([1, 1], &device);
        let h = Tensor::<TestBackend, 2>::zeros([1, 1], &device);
        let c = Tensor::<TestBackend, 2>::ones([1, 1], &device);
        let (_, new_c) = cell.forward(input, (h, c));

        // f = sigmoid(0) and the candidate is tanh(0), so c' = 0.5 * c
        let value: f32 = new_c.into_scalar();
        assert!((value - 0.5).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn test_lstm_step_returns_two_states() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(20, 50, &device);

        let input = Tensor::<TestBackend, 2>::zeros([4, 20], &device);
        let state = CellState::zeros(&cell.state_size(), 4, &device);
        let (output, new_state) = cell.step(input, state);

        assert_eq!(output.dims(), [4, 50]);
        assert_eq!(new_state.arity(), 2);
        let hidden = new_state.tensors()[0].clone();
        let diff = (output - hidden).abs().sum().into_scalar();
        assert!(diff < 1e-6, "Output should equal the new hidden state");
    }

    #[test]
    fn test_lstm_state_persistence() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(10, 20, &device);

        let mut h = Tensor::<TestBackend, 2>::zeros([1, 20], &device);
        let mut c = Tensor::<TestBackend, 2>::zeros([1, 20], &device);

        for _ in 0..3 {
            let input = Tensor::<TestBackend, 2>::random(
                [1, 10],
                burn::tensor::Distribution::Uniform(0.0, 1.0),
                &device,
            );
            (h, c) = cell.forward(input, (h, c));
        }

        let h_sum = h.abs().sum().into_scalar();
        let c_sum = c.abs().sum().into_scalar();
        assert!(
            h_sum != 0.0 || c_sum != 0.0,
            "States should have changed after processing sequence"
        );
    }

    #[test]
    fn test_lstm_forget_gate() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(10, 20, &device);

        let h = Tensor::<TestBackend, 2>::zeros([1, 20], &device);
        let c = Tensor::<TestBackend, 2>::ones([1, 20], &device) * 10.0;
        let input = Tensor::<TestBackend, 2>::zeros([1, 10], &device);

        let (_, new_c) = cell.forward(input, (h, c));

        let c_sum_old = 10.0 * 20.0;
        let c_sum_new: f32 = new_c.sum().into_scalar();
        assert!(
            (c_sum_new - c_sum_old).abs() > 0.1,
            "Forget gate should modify cell state"
        );
    }

    #[test]
    fn test_lstm_batch_sizes() {
        let device = Default::default();
        let cell = LstmCell::<TestBackend>::new(20, 50, &device);

        for batch_size in [1, 4, 16, 32] {
            let input = Tensor::<TestBackend, 2>::zeros([batch_size, 20], &device);
            let h = Tensor::<TestBackend, 2>::zeros([batch_size, 50], &device);
            let c = Tensor::<TestBackend, 2>::zeros([batch_size, 50], &device);

            let (new_h, new_c) = cell.forward(input, (h, c));

            assert_eq!(new_h.dims(), [batch_size, 50]);
            assert_eq!(new_c.dims(), [batch_size, 50]);
        }
    }
}
