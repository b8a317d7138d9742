//! Tests for the stacked recurrent processor
//!
//! The fixture cells use all-ones weights and no activation, so every output is an
//! exact integer that can be checked by hand.

use burn::backend::NdArray;
use burn::nn::Initializer;
use burn::tensor::{Bool, Tensor, TensorData};
use cellstack::activation::Activation;
use cellstack::cells::{CellState, RecurrentCell, SimpleRnnCellConfig, StateSize};
use cellstack::rnn::{RnnConfig, StackedRnn, StateBundle};
use cellstack::NnError;

type Backend = NdArray<f32>;

/// `out = x·K + h·R`, state `[out]`.
#[derive(Debug)]
struct OneStateCell {
    input_size: usize,
    units: usize,
}

impl RecurrentCell<Backend> for OneStateCell {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.units
    }

    fn state_size(&self) -> StateSize {
        StateSize::Single(self.units)
    }

    fn step(
        &self,
        input: Tensor<Backend, 2>,
        state: CellState<Backend>,
    ) -> (Tensor<Backend, 2>, CellState<Backend>) {
        let device = input.device();
        let kernel = Tensor::ones([self.input_size, self.units], &device);
        let recurrent = Tensor::ones([self.units, self.units], &device);
        let prev = state.into_primary().expect("single state");

        let output = input.matmul(kernel) + prev.matmul(recurrent);
        (output.clone(), CellState::Single(output))
    }
}

/// `o1 = x·K + h1·R1`, `o2 = x·K + h2·R2`, `out = o1 + o2`, state `[o1, o2]`.
#[derive(Debug)]
struct TwoStatesCell {
    input_size: usize,
    units: usize,
}

impl RecurrentCell<Backend> for TwoStatesCell {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.units
    }

    fn state_size(&self) -> StateSize {
        StateSize::Multi(vec![self.units, self.units])
    }

    fn step(
        &self,
        input: Tensor<Backend, 2>,
        state: CellState<Backend>,
    ) -> (Tensor<Backend, 2>, CellState<Backend>) {
        let device = input.device();
        let kernel = Tensor::ones([self.input_size, self.units], &device);
        let recurrent = Tensor::ones([self.units, self.units], &device);
        let mut states = state.into_tensors().into_iter();
        let h1 = states.next().expect("first state");
        let h2 = states.next().expect("second state");

        let projected = input.matmul(kernel);
        let o1 = projected.clone() + h1.matmul(recurrent.clone());
        let o2 = projected + h2.matmul(recurrent);
        (o1.clone() + o2.clone(), CellState::Multi(vec![o1, o2]))
    }
}

fn single_state_stack(config: RnnConfig) -> StackedRnn<Backend> {
    StackedRnn::new(config)
        .with_cell(OneStateCell { input_size: 4, units: 3 })
        .with_cell(OneStateCell { input_size: 3, units: 2 })
}

fn two_states_stack(config: RnnConfig) -> StackedRnn<Backend> {
    StackedRnn::new(config)
        .with_cell(TwoStatesCell { input_size: 4, units: 3 })
        .with_cell(TwoStatesCell { input_size: 3, units: 2 })
}

/// `[2, 3, 4]` holding `0..24`.
fn sequence() -> Tensor<Backend, 3> {
    let device = Default::default();
    let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
    Tensor::<Backend, 1>::from_data(TensorData::new(values, [24]), &device).reshape([2, 3, 4])
}

/// Reverse the time axis of `[batch, time, features]`.
fn reversed(input: Tensor<Backend, 3>) -> Tensor<Backend, 3> {
    let [batch, time, features] = input.dims();
    let steps = (0..time)
        .rev()
        .map(|t| input.clone().slice([0..batch, t..t + 1, 0..features]))
        .collect();
    Tensor::cat(steps, 1)
}

fn mask(rows: [[bool; 3]; 2]) -> Tensor<Backend, 2, Bool> {
    let device = Default::default();
    let values: Vec<f32> = rows
        .iter()
        .flatten()
        .map(|&keep| if keep { 1.0 } else { 0.0 })
        .collect();
    Tensor::<Backend, 1>::from_data(TensorData::new(values, [6]), &device)
        .reshape([2, 3])
        .greater_elem(0.5)
}

/// Expand per-row values over `units` columns.
fn rows(values: &[f32], units: usize) -> Vec<f32> {
    values
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(units))
        .collect()
}

fn values<const D: usize>(tensor: Tensor<Backend, D>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().unwrap()
}

fn assert_close<const D: usize>(tensor: Tensor<Backend, D>, expected: &[f32]) {
    let actual = values(tensor);
    assert_eq!(actual.len(), expected.len(), "element count");
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-4 * e.abs().max(1.0),
            "element {index}: got {a}, expected {e}"
        );
    }
}

fn state_tensors(bundle: &StateBundle<Backend>, cell: usize) -> Vec<Tensor<Backend, 2>> {
    bundle
        .get(cell)
        .expect("cell state")
        .tensors()
        .into_iter()
        .cloned()
        .collect()
}

#[test]
fn test_single_state_stack_output() {
    let mut rnn = single_state_stack(RnnConfig::new());
    let result = rnn.forward(sequence(), None, None).unwrap();

    assert_close(result.output.into_last().unwrap(), &rows(&[786.0, 4386.0], 2));
    assert!(result.final_state.is_none());
}

#[test]
fn test_single_state_stack_sequences() {
    let mut rnn = single_state_stack(RnnConfig::new().with_return_sequences(true));
    let result = rnn.forward(sequence(), None, None).unwrap();

    assert_close(
        result.output.into_sequence().unwrap(),
        &rows(&[18.0, 156.0, 786.0, 162.0, 1020.0, 4386.0], 2),
    );
}

#[test]
fn test_single_state_stack_returns_states() {
    for return_sequences in [false, true] {
        let mut rnn = single_state_stack(
            RnnConfig::new()
                .with_return_state(true)
                .with_return_sequences(return_sequences),
        );
        let result = rnn.forward(sequence(), None, None).unwrap();
        let state = result.final_state.unwrap();

        assert_eq!(state.len(), 2);
        assert_close(state_tensors(&state, 0).remove(0), &rows(&[158.0, 782.0], 3));
        // the top cell's state is its output
        assert_close(state_tensors(&state, 1).remove(0), &rows(&[786.0, 4386.0], 2));
    }
}

#[test]
fn test_two_states_stack_output() {
    let mut rnn = two_states_stack(RnnConfig::new());
    let result = rnn.forward(sequence(), None, None).unwrap();

    assert_close(result.output.into_last().unwrap(), &rows(&[3144.0, 17544.0], 2));
}

#[test]
fn test_two_states_stack_sequences() {
    let mut rnn = two_states_stack(RnnConfig::new().with_return_sequences(true));
    let result = rnn.forward(sequence(), None, None).unwrap();

    assert_close(
        result.output.into_sequence().unwrap(),
        &rows(&[72.0, 624.0, 3144.0, 648.0, 4080.0, 17544.0], 2),
    );
}

#[test]
fn test_two_states_stack_returns_states() {
    let mut rnn = two_states_stack(RnnConfig::new().with_return_state(true));
    let result = rnn.forward(sequence(), None, None).unwrap();
    let state = result.final_state.unwrap();

    let first = state_tensors(&state, 0);
    assert_eq!(first.len(), 2);
    for tensor in first {
        assert_close(tensor, &rows(&[158.0, 782.0], 3));
    }

    let second = state_tensors(&state, 1);
    assert_eq!(second.len(), 2);
    for tensor in second {
        assert_close(tensor, &rows(&[1572.0, 8772.0], 2));
    }
}

#[test]
fn test_stateful_single_state_stack() {
    let mut rnn = single_state_stack(RnnConfig::new().with_stateful(true));

    rnn.forward(sequence(), None, None).unwrap();
    let second = rnn.forward(sequence(), None, None).unwrap();

    assert_close(second.output.into_last().unwrap(), &rows(&[34092.0, 173196.0], 2));
}

#[test]
fn test_stateful_two_states_stack() {
    let mut rnn = two_states_stack(RnnConfig::new().with_stateful(true));

    rnn.forward(sequence(), None, None).unwrap();
    let second = rnn.forward(sequence(), None, None).unwrap();

    assert_close(second.output.into_last().unwrap(), &rows(&[136368.0, 692784.0], 2));
}

#[test]
fn test_reset_states_restores_first_call() {
    let mut rnn = single_state_stack(RnnConfig::new().with_stateful(true));

    rnn.forward(sequence(), None, None).unwrap();
    assert!(rnn.states().is_some());
    rnn.reset_states();
    assert!(rnn.states().is_none());

    let result = rnn.forward(sequence(), None, None).unwrap();
    assert_close(result.output.into_last().unwrap(), &rows(&[786.0, 4386.0], 2));
}

#[test]
fn test_reset_states_to_explicit_bundle() {
    let device = Default::default();
    let mut rnn = single_state_stack(RnnConfig::new().with_stateful(true));
    let mut reference = single_state_stack(RnnConfig::new().with_return_state(true));

    // seeding the stateful stack with the first call's final state
    let state = reference
        .forward(sequence(), None, None)
        .unwrap()
        .final_state
        .unwrap();
    rnn.reset_states_to(state).unwrap();
    let result = rnn.forward(sequence(), None, None).unwrap();
    assert_close(result.output.into_last().unwrap(), &rows(&[34092.0, 173196.0], 2));

    // a bundle for the wrong stack is rejected
    let wrong = StateBundle::new(vec![CellState::Single(Tensor::zeros([2, 3], &device))]);
    assert!(matches!(
        rnn.reset_states_to(wrong),
        Err(NnError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_non_stateful_calls_are_independent() {
    let mut rnn = two_states_stack(RnnConfig::new());

    let first = values(rnn.forward(sequence(), None, None).unwrap().output.into_last().unwrap());
    let second = values(rnn.forward(sequence(), None, None).unwrap().output.into_last().unwrap());

    assert_eq!(first, second);
    assert!(rnn.states().is_none());
}

#[test]
fn test_explicit_initial_state() {
    let device = Default::default();
    let mut rnn = single_state_stack(RnnConfig::new());

    // zeros behave exactly like no initial state
    let zeros = StateBundle::zeros(rnn.cells(), 2, &device);
    let result = rnn.forward(sequence(), Some(zeros), None).unwrap();
    assert_close(result.output.into_last().unwrap(), &rows(&[786.0, 4386.0], 2));

    // a ones state in the top cell gives 18 + 2 = 20 at t0, then
    // 3·40 + 2·20 = 160, then 3·158 + 2·160 = 794
    let bundle = StateBundle::new(vec![
        CellState::Single(Tensor::zeros([2, 3], &device)),
        CellState::Single(Tensor::ones([2, 2], &device)),
    ]);
    let result = rnn.forward(sequence(), Some(bundle), None).unwrap();
    let last = values(result.output.into_last().unwrap());
    assert_eq!(last[0], 794.0);
}

#[test]
fn test_initial_state_arity_mismatch() {
    let device = Default::default();
    let mut rnn = two_states_stack(RnnConfig::new());

    // cell 0 declares two states but receives one
    let bundle = StateBundle::new(vec![
        CellState::Single(Tensor::zeros([2, 3], &device)),
        CellState::Multi(vec![Tensor::zeros([2, 2], &device), Tensor::zeros([2, 2], &device)]),
    ]);
    assert!(matches!(
        rnn.forward(sequence(), Some(bundle), None),
        Err(NnError::ShapeMismatch { .. })
    ));

    // one entry per cell is required
    let bundle = StateBundle::new(vec![CellState::Multi(vec![
        Tensor::zeros([2, 3], &device),
        Tensor::zeros([2, 3], &device),
    ])]);
    assert!(rnn.forward(sequence(), Some(bundle), None).is_err());
}

#[test]
fn test_stateful_rejects_explicit_initial_state() {
    let device = Default::default();
    let mut rnn = single_state_stack(RnnConfig::new().with_stateful(true));
    let bundle = StateBundle::zeros(rnn.cells(), 2, &device);

    assert!(matches!(
        rnn.forward(sequence(), Some(bundle), None),
        Err(NnError::Configuration(_))
    ));
}

#[test]
fn test_failed_call_keeps_persisted_state() {
    let device = Default::default();
    let mut rnn = single_state_stack(RnnConfig::new().with_stateful(true));
    rnn.forward(sequence(), None, None).unwrap();

    // wrong feature width fails before any timestep runs
    let bad_input = Tensor::<Backend, 3>::zeros([2, 3, 5], &device);
    assert!(rnn.forward(bad_input, None, None).is_err());

    // the persisted batch size no longer fits a different batch
    let other_batch = Tensor::<Backend, 3>::zeros([3, 3, 4], &device);
    assert!(matches!(
        rnn.forward(other_batch, None, None),
        Err(NnError::ShapeMismatch { .. })
    ));

    let result = rnn.forward(sequence(), None, None).unwrap();
    assert_close(result.output.into_last().unwrap(), &rows(&[34092.0, 173196.0], 2));
}

#[test]
fn test_go_backwards_matches_reversed_input() {
    let mut backwards = single_state_stack(RnnConfig::new().with_go_backwards(true));
    let mut forwards = single_state_stack(RnnConfig::new());

    let expected = values(
        forwards
            .forward(reversed(sequence()), None, None)
            .unwrap()
            .output
            .into_last()
            .unwrap(),
    );
    let actual = values(backwards.forward(sequence(), None, None).unwrap().output.into_last().unwrap());

    assert_eq!(actual, expected);
}

#[test]
fn test_go_backwards_sequences_in_processing_order() {
    let mut rnn = two_states_stack(
        RnnConfig::new()
            .with_go_backwards(true)
            .with_return_sequences(true),
    );
    let mut last_only = two_states_stack(RnnConfig::new().with_go_backwards(true));

    let sequence_out = rnn.forward(sequence(), None, None).unwrap().output.into_sequence().unwrap();
    let last = last_only.forward(sequence(), None, None).unwrap().output.into_last().unwrap();

    let final_row = sequence_out.slice([0..2, 2..3, 0..2]).reshape([2, 2]);
    assert_eq!(values(final_row), values(last));
}

#[test]
fn test_all_true_mask_is_a_no_op() {
    let mut rnn = two_states_stack(RnnConfig::new().with_return_sequences(true));

    let masked = rnn
        .forward(sequence(), None, Some(mask([[true; 3]; 2])))
        .unwrap()
        .output
        .into_sequence()
        .unwrap();
    assert_close(masked, &rows(&[72.0, 624.0, 3144.0, 648.0, 4080.0, 17544.0], 2));
}

#[test]
fn test_masked_step_carries_output_and_state() {
    let mut rnn = single_state_stack(
        RnnConfig::new()
            .with_return_sequences(true)
            .with_return_state(true),
    );

    let result = rnn
        .forward(sequence(), None, Some(mask([[true, true, false]; 2])))
        .unwrap();

    assert_close(
        result.output.into_sequence().unwrap(),
        &rows(&[18.0, 156.0, 156.0, 162.0, 1020.0, 1020.0], 2),
    );
    let state = result.final_state.unwrap();
    assert_close(state_tensors(&state, 0).remove(0), &rows(&[40.0, 232.0], 3));
    assert_close(state_tensors(&state, 1).remove(0), &rows(&[156.0, 1020.0], 2));
}

#[test]
fn test_masked_step_with_zero_output() {
    let mut rnn = single_state_stack(
        RnnConfig::new()
            .with_return_sequences(true)
            .with_zero_output_for_mask(true),
    );

    // only the second sample skips its middle step
    let output = rnn
        .forward(sequence(), None, Some(mask([[true, true, true], [true, false, true]])))
        .unwrap()
        .output
        .into_sequence()
        .unwrap();

    // sample 1: t0 cell0 54, cell1 162; t1 skipped; t2 cell0 86 + 3·54 = 248,
    // cell1 3·248 + 2·162 = 1068
    assert_close(
        output,
        &rows(&[18.0, 156.0, 786.0, 162.0, 0.0, 1068.0], 2),
    );
}

#[test]
fn test_simple_rnn_cell_matches_fixture() {
    let device = Default::default();
    let linear_ones = |input_size, units| {
        SimpleRnnCellConfig::new(input_size, units)
            .with_activation(Activation::Linear)
            .with_use_bias(false)
            .with_kernel_initializer(Initializer::Ones)
            .with_recurrent_initializer(Initializer::Ones)
            .init::<Backend>(&device)
    };
    let mut rnn = StackedRnn::new(RnnConfig::new())
        .with_cell(linear_ones(4, 3))
        .with_cell(linear_ones(3, 2));

    let result = rnn.forward(sequence(), None, None).unwrap();
    assert_close(result.output.into_last().unwrap(), &rows(&[786.0, 4386.0], 2));
}
