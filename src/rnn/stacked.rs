//! Stacked recurrent processing.
//!
//! Drives an ordered list of cells over a sequence. At every timestep the input
//! vector enters cell 0, each cell's output feeds the next cell, and the last cell's
//! output is the stack output for that timestep. Each cell only ever sees its own
//! state from the previous timestep.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor};
use tracing::{debug, trace};

use crate::cells::{CellState, RecurrentCell, StateSize};
use crate::error::{NnError, Result};

/// Options of a [`StackedRnn`].
#[derive(Config, Debug)]
pub struct RnnConfig {
    /// Emit the output of every timestep instead of only the last one.
    #[config(default = false)]
    pub return_sequences: bool,
    /// Also return the final state bundle.
    #[config(default = false)]
    pub return_state: bool,
    /// Keep the final state bundle as the initial state of the next call.
    #[config(default = false)]
    pub stateful: bool,
    /// Iterate time in reverse. Sequence outputs are in processing order.
    #[config(default = false)]
    pub go_backwards: bool,
    /// Emit zeros instead of the carried output at masked timesteps.
    #[config(default = false)]
    pub zero_output_for_mask: bool,
}

/// One [`CellState`] per cell of a stack, in stack order.
#[derive(Debug, Clone)]
pub struct StateBundle<B: Backend> {
    states: Vec<CellState<B>>,
}

impl<B: Backend> StateBundle<B> {
    pub fn new(states: Vec<CellState<B>>) -> Self {
        Self { states }
    }

    /// Zero states for every cell of `cells`.
    pub fn zeros(cells: &[Box<dyn RecurrentCell<B>>], batch_size: usize, device: &B::Device) -> Self {
        Self::new(
            cells
                .iter()
                .map(|cell| CellState::zeros(&cell.state_size(), batch_size, device))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of the cell at `index`.
    pub fn get(&self, index: usize) -> Option<&CellState<B>> {
        self.states.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellState<B>> {
        self.states.iter()
    }

    pub fn into_states(self) -> Vec<CellState<B>> {
        self.states
    }

    /// Batch size of the first state tensor, if any.
    pub fn batch_size(&self) -> Option<usize> {
        self.states
            .first()
            .and_then(|state| state.tensors().first().map(|tensor| tensor.dims()[0]))
    }
}

impl<B: Backend> From<Vec<CellState<B>>> for StateBundle<B> {
    fn from(states: Vec<CellState<B>>) -> Self {
        Self::new(states)
    }
}

/// Output of a forward pass.
#[derive(Debug, Clone)]
pub enum RnnOutput<B: Backend> {
    /// `[batch, output_size]`, the output of the last processed timestep.
    Last(Tensor<B, 2>),
    /// `[batch, time, output_size]`, one row per timestep in processing order.
    Sequence(Tensor<B, 3>),
}

impl<B: Backend> RnnOutput<B> {
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Last(tensor) => tensor.dims().to_vec(),
            Self::Sequence(tensor) => tensor.dims().to_vec(),
        }
    }

    pub fn into_last(self) -> Option<Tensor<B, 2>> {
        match self {
            Self::Last(tensor) => Some(tensor),
            Self::Sequence(_) => None,
        }
    }

    pub fn into_sequence(self) -> Option<Tensor<B, 3>> {
        match self {
            Self::Sequence(tensor) => Some(tensor),
            Self::Last(_) => None,
        }
    }
}

/// Result of [`StackedRnn::forward`].
#[derive(Debug, Clone)]
pub struct RnnForward<B: Backend> {
    pub output: RnnOutput<B>,
    /// Present when `return_state` is set.
    pub final_state: Option<StateBundle<B>>,
}

/// A stack of recurrent cells processed together over time.
///
/// # Statefulness
///
/// With `stateful` set, the final state bundle of each call is kept on the instance
/// and used as the initial state of the next call. `forward` takes `&mut self`, so
/// calls on one instance are serialized; sharing a stateful instance across
/// threads needs external locking.
///
/// # Example
///
/// ```ignore
/// let mut rnn = StackedRnn::<Backend>::new(RnnConfig::new().with_return_sequences(true))
///     .with_cell(SimpleRnnCell::new(16, 32, &device))
///     .with_cell(LstmCell::new(32, 8, &device));
///
/// let result = rnn.forward(input, None, None)?; // input: [batch, time, 16]
/// let sequence = result.output.into_sequence();  // [batch, time, 8]
/// ```
#[derive(Debug)]
pub struct StackedRnn<B: Backend> {
    cells: Vec<Box<dyn RecurrentCell<B>>>,
    config: RnnConfig,
    states: Option<StateBundle<B>>,
}

impl<B: Backend> StackedRnn<B> {
    /// Create an empty stack; add cells with [`Self::with_cell`].
    pub fn new(config: RnnConfig) -> Self {
        Self::from_cells(Vec::new(), config)
    }

    pub fn from_cells(cells: Vec<Box<dyn RecurrentCell<B>>>, config: RnnConfig) -> Self {
        Self {
            cells,
            config,
            states: None,
        }
    }

    /// Append a cell on top of the stack.
    pub fn with_cell(mut self, cell: impl RecurrentCell<B> + 'static) -> Self {
        self.cells.push(Box::new(cell));
        self
    }

    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    pub fn cells(&self) -> &[Box<dyn RecurrentCell<B>>] {
        &self.cells
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Output width of the top cell.
    pub fn output_size(&self) -> Option<usize> {
        self.cells.last().map(|cell| cell.output_size())
    }

    /// Declared state layout of every cell, in stack order.
    pub fn state_sizes(&self) -> Vec<StateSize> {
        self.cells.iter().map(|cell| cell.state_size()).collect()
    }

    /// State persisted by the last stateful call.
    pub fn states(&self) -> Option<&StateBundle<B>> {
        self.states.as_ref()
    }

    /// Drop the persisted state; the next stateful call starts from zeros.
    pub fn reset_states(&mut self) {
        if self.states.take().is_some() {
            debug!(cells = self.cells.len(), "reset persisted rnn state");
        }
    }

    /// Replace the persisted state of a stateful stack.
    pub fn reset_states_to(&mut self, states: StateBundle<B>) -> Result<()> {
        if !self.config.stateful {
            return Err(NnError::configuration(
                "reset_states_to requires a stateful rnn",
            ));
        }
        let batch_size = states.batch_size().unwrap_or(0);
        self.validate_bundle(&states, batch_size, "reset state")?;
        debug!(cells = self.cells.len(), batch_size, "replaced persisted rnn state");
        self.states = Some(states);
        Ok(())
    }

    /// Process `input` (`[batch, time, features]`) through the stack.
    ///
    /// `initial_state` overrides the zero state of a non-stateful stack. `mask`
    /// (`[batch, time]`) marks the timesteps to process; at a `false` entry every
    /// cell keeps its previous state and the previous output is repeated.
    ///
    /// All shape checks run before the first timestep, so a failing call leaves the
    /// persisted state untouched.
    ///
    /// # Arguments
    /// * `input` - Sequence batch of shape `[batch, time, input_size]`
    /// * `initial_state` - One state per cell, or `None` for zeros; must be `None`
    ///   for a stateful stack, which starts from its persisted state
    /// * `mask` - Optional `[batch, time]` boolean mask
    ///
    /// # Returns
    /// An [`RnnForward`] whose output is [`RnnOutput::Last`] or, with
    /// `return_sequences`, [`RnnOutput::Sequence`]; with `return_state` it also
    /// carries the final state of each cell.
    pub fn forward(
        &mut self,
        input: Tensor<B, 3>,
        initial_state: Option<StateBundle<B>>,
        mask: Option<Tensor<B, 2, Bool>>,
    ) -> Result<RnnForward<B>> {
        let [batch_size, timesteps, features] = input.dims();
        let device = input.device();

        if self.cells.is_empty() {
            return Err(NnError::configuration("stacked rnn has no cells"));
        }
        if timesteps == 0 {
            return Err(NnError::shape_mismatch(
                "input timesteps",
                vec![batch_size, 1, features],
                vec![batch_size, timesteps, features],
            ));
        }
        self.validate_stack(features)?;
        if let Some(mask) = &mask {
            let dims = mask.dims();
            if dims != [batch_size, timesteps] {
                return Err(NnError::shape_mismatch(
                    "mask",
                    vec![batch_size, timesteps],
                    dims.to_vec(),
                ));
            }
        }

        let bundle = match (self.config.stateful, initial_state) {
            (true, Some(_)) => {
                return Err(NnError::configuration(
                    "a stateful rnn carries its own state; use reset_states_to instead of \
                     passing an initial state",
                ))
            }
            (true, None) => match &self.states {
                Some(persisted) => {
                    self.validate_bundle(persisted, batch_size, "persisted state")?;
                    persisted.clone()
                }
                None => StateBundle::zeros(&self.cells, batch_size, &device),
            },
            (false, Some(explicit)) => {
                self.validate_bundle(&explicit, batch_size, "initial state")?;
                explicit
            }
            (false, None) => StateBundle::zeros(&self.cells, batch_size, &device),
        };

        trace!(
            batch_size,
            timesteps,
            features,
            cells = self.cells.len(),
            go_backwards = self.config.go_backwards,
            "running stacked rnn"
        );

        let output_size = self.cells[self.cells.len() - 1].output_size();
        let mut states = bundle.into_states();
        let mut last_output = Tensor::<B, 2>::zeros([batch_size, output_size], &device);
        let mut outputs = Vec::with_capacity(if self.config.return_sequences {
            timesteps
        } else {
            0
        });

        for step in 0..timesteps {
            let t = if self.config.go_backwards {
                timesteps - 1 - step
            } else {
                step
            };

            let step_mask = mask
                .as_ref()
                .map(|mask| mask.clone().slice([0..batch_size, t..t + 1]).float());
            let previous_states = step_mask.as_ref().map(|_| states.clone());

            let mut carry = input
                .clone()
                .slice([0..batch_size, t..t + 1, 0..features])
                .reshape([batch_size, features]);
            let mut next_states = Vec::with_capacity(self.cells.len());
            for (cell, state) in self.cells.iter().zip(states) {
                let (output, new_state) = cell.step(carry, state);
                carry = output;
                next_states.push(new_state);
            }
            states = next_states;

            let emitted = match (step_mask, previous_states) {
                (Some(keep_new), Some(previous)) => {
                    let keep_old = keep_new.clone().neg() + 1.0;
                    states = states
                        .into_iter()
                        .zip(previous)
                        .map(|(new, old)| {
                            new.zip_with(old, |n, o| {
                                n * keep_new.clone() + o * keep_old.clone()
                            })
                        })
                        .collect();
                    if self.config.zero_output_for_mask {
                        carry * keep_new
                    } else {
                        carry * keep_new + last_output.clone() * keep_old
                    }
                }
                _ => carry,
            };

            last_output = emitted.clone();
            if self.config.return_sequences {
                outputs.push(emitted);
            }
        }

        let bundle = StateBundle::new(states);
        if self.config.stateful {
            debug!(cells = bundle.len(), batch_size, "persisting rnn state for next call");
            self.states = Some(bundle.clone());
        }

        let output = if self.config.return_sequences {
            RnnOutput::Sequence(Tensor::stack::<3>(outputs, 1))
        } else {
            RnnOutput::Last(last_output)
        };
        let final_state = if self.config.return_state {
            Some(bundle)
        } else {
            None
        };

        Ok(RnnForward {
            output,
            final_state,
        })
    }

    /// Check the input width and that each cell's output feeds the next cell.
    fn validate_stack(&self, features: usize) -> Result<()> {
        let first = &self.cells[0];
        if first.input_size() != features {
            return Err(NnError::shape_mismatch(
                "input features of cell 0",
                vec![first.input_size()],
                vec![features],
            ));
        }
        for (index, pair) in self.cells.windows(2).enumerate() {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(NnError::shape_mismatch(
                    format!("input features of cell {}", index + 1),
                    vec![pair[1].input_size()],
                    vec![pair[0].output_size()],
                ));
            }
        }
        Ok(())
    }

    fn validate_bundle(&self, bundle: &StateBundle<B>, batch_size: usize, context: &str) -> Result<()> {
        if bundle.len() != self.cells.len() {
            return Err(NnError::shape_mismatch(
                format!("{context} (one entry per cell)"),
                vec![self.cells.len()],
                vec![bundle.len()],
            ));
        }
        for (index, (cell, state)) in self.cells.iter().zip(bundle.iter()).enumerate() {
            state.validate(
                &cell.state_size(),
                batch_size,
                &format!("{context}, cell {index}"),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::{LstmCell, SimpleRnnCell};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn two_layer_stack(config: RnnConfig) -> StackedRnn<TestBackend> {
        let device = Default::default();
        StackedRnn::new(config)
            .with_cell(SimpleRnnCell::new(4, 6, &device))
            .with_cell(LstmCell::new(6, 3, &device))
    }

    #[test]
    fn test_default_config() {
        let config = RnnConfig::new();
        assert!(!config.return_sequences);
        assert!(!config.return_state);
        assert!(!config.stateful);
        assert!(!config.go_backwards);
        assert!(!config.zero_output_for_mask);
    }

    #[test]
    fn test_stack_metadata() {
        let rnn = two_layer_stack(RnnConfig::new());

        assert_eq!(rnn.num_cells(), 2);
        assert_eq!(rnn.output_size(), Some(3));
        assert_eq!(
            rnn.state_sizes(),
            vec![StateSize::Single(6), StateSize::Multi(vec![3, 3])]
        );
    }

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 3>::zeros([2, 5, 4], &device);

        let mut last_only = two_layer_stack(RnnConfig::new());
        let result = last_only.forward(input.clone(), None, None).unwrap();
        assert_eq!(result.output.dims(), vec![2, 3]);
        assert!(result.final_state.is_none());

        let mut sequences = two_layer_stack(
            RnnConfig::new()
                .with_return_sequences(true)
                .with_return_state(true),
        );
        let result = sequences.forward(input, None, None).unwrap();
        assert_eq!(result.output.dims(), vec![2, 5, 3]);
        let state = result.final_state.unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(1).map(|s| s.arity()), Some(2));
    }

    #[test]
    fn test_empty_stack_is_a_configuration_error() {
        let device = Default::default();
        let mut rnn = StackedRnn::<TestBackend>::new(RnnConfig::new());
        let input = Tensor::<TestBackend, 3>::zeros([1, 2, 3], &device);

        assert!(matches!(
            rnn.forward(input, None, None),
            Err(NnError::Configuration(_))
        ));
    }

    #[test]
    fn test_input_width_mismatch() {
        let device = Default::default();
        let mut rnn = two_layer_stack(RnnConfig::new());
        let input = Tensor::<TestBackend, 3>::zeros([2, 5, 7], &device);

        assert!(matches!(
            rnn.forward(input, None, None),
            Err(NnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_broken_cell_chain() {
        let device = Default::default();
        let mut rnn = StackedRnn::<TestBackend>::new(RnnConfig::new())
            .with_cell(SimpleRnnCell::new(4, 6, &device))
            .with_cell(SimpleRnnCell::new(5, 2, &device));
        let input = Tensor::<TestBackend, 3>::zeros([2, 3, 4], &device);

        match rnn.forward(input, None, None) {
            Err(NnError::ShapeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, vec![5]);
                assert_eq!(actual, vec![6]);
            }
            other => panic!("expected a shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_mask_shape_is_checked() {
        let device = Default::default();
        let mut rnn = two_layer_stack(RnnConfig::new());
        let input = Tensor::<TestBackend, 3>::zeros([2, 5, 4], &device);
        let mask = Tensor::<TestBackend, 2>::ones([2, 4], &device).greater_elem(0.5);

        assert!(rnn.forward(input, None, Some(mask)).is_err());
    }

    #[test]
    fn test_reset_states_to_requires_stateful() {
        let device = Default::default();
        let mut rnn = two_layer_stack(RnnConfig::new());
        let bundle = StateBundle::zeros(rnn.cells(), 2, &device);

        assert!(matches!(
            rnn.reset_states_to(bundle),
            Err(NnError::Configuration(_))
        ));
    }
}
