//! # Recurrent Cell Implementations
//!
//! A cell computes one recurrence step: it maps the input at time `t` and its own
//! state from `t - 1` to an output and a new state. Cells never see a whole
//! sequence; the [`StackedRnn`](crate::rnn::StackedRnn) processor drives them
//! over time and through the stack.
//!
//! ## Cell Types
//!
//! | Cell | State | Description |
//! |------|-------|-------------|
//! | [`SimpleRnnCell`] | single | `h' = act(x·K + h·R + b)` |
//! | [`GruCell`] | single | Gated recurrent unit, reset gate after the recurrent matmul |
//! | [`LstmCell`] | `(h, c)` | Long short-term memory with unit forget bias |
//!
//! Any type implementing [`RecurrentCell`] can be stacked, including cells
//! defined outside this crate.
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | `input` | `[batch, input_size]` |
//! | each state tensor | `[batch, state_size[i]]` |
//! | `output` | `[batch, output_size]` |

pub mod gru_cell;
pub mod lstm_cell;
pub mod simple_rnn_cell;

pub use gru_cell::{GruCell, GruCellConfig};
pub use lstm_cell::{LstmCell, LstmCellConfig};
pub use simple_rnn_cell::{SimpleRnnCell, SimpleRnnCellConfig};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{NnError, Result};

/// Declared state layout of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSize {
    /// The state is one tensor of this width.
    Single(usize),
    /// The state is an ordered tuple of tensors with these widths.
    Multi(Vec<usize>),
}

impl StateSize {
    /// Number of tensors making up the state.
    pub fn arity(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(sizes) => sizes.len(),
        }
    }

    /// Width of every state tensor, in order.
    pub fn sizes(&self) -> Vec<usize> {
        match self {
            Self::Single(size) => vec![*size],
            Self::Multi(sizes) => sizes.clone(),
        }
    }
}

/// Runtime state of one cell, shaped after its [`StateSize`].
#[derive(Debug, Clone)]
pub enum CellState<B: Backend> {
    Single(Tensor<B, 2>),
    Multi(Vec<Tensor<B, 2>>),
}

impl<B: Backend> CellState<B> {
    /// Zero state for `batch_size` rows.
    pub fn zeros(size: &StateSize, batch_size: usize, device: &B::Device) -> Self {
        match size {
            StateSize::Single(units) => Self::Single(Tensor::zeros([batch_size, *units], device)),
            StateSize::Multi(sizes) => Self::Multi(
                sizes
                    .iter()
                    .map(|units| Tensor::zeros([batch_size, *units], device))
                    .collect(),
            ),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(tensors) => tensors.len(),
        }
    }

    /// Borrow the state tensors in order.
    pub fn tensors(&self) -> Vec<&Tensor<B, 2>> {
        match self {
            Self::Single(tensor) => vec![tensor],
            Self::Multi(tensors) => tensors.iter().collect(),
        }
    }

    pub fn into_tensors(self) -> Vec<Tensor<B, 2>> {
        match self {
            Self::Single(tensor) => vec![tensor],
            Self::Multi(tensors) => tensors,
        }
    }

    /// Take the first state tensor, the one a single-state cell reads.
    pub fn into_primary(self) -> Option<Tensor<B, 2>> {
        match self {
            Self::Single(tensor) => Some(tensor),
            Self::Multi(tensors) => tensors.into_iter().next(),
        }
    }

    /// The state tensor of a single-state cell.
    pub fn as_single(&self) -> Option<&Tensor<B, 2>> {
        match self {
            Self::Single(tensor) => Some(tensor),
            Self::Multi(_) => None,
        }
    }

    /// Apply `f` to every state tensor, keeping the layout.
    pub fn map(self, mut f: impl FnMut(Tensor<B, 2>) -> Tensor<B, 2>) -> Self {
        match self {
            Self::Single(tensor) => Self::Single(f(tensor)),
            Self::Multi(tensors) => Self::Multi(tensors.into_iter().map(f).collect()),
        }
    }

    /// Combine two states of the same layout tensor by tensor.
    pub(crate) fn zip_with(
        self,
        other: Self,
        mut f: impl FnMut(Tensor<B, 2>, Tensor<B, 2>) -> Tensor<B, 2>,
    ) -> Self {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => Self::Single(f(a, b)),
            (a, b) => Self::Multi(
                a.into_tensors()
                    .into_iter()
                    .zip(b.into_tensors())
                    .map(|(x, y)| f(x, y))
                    .collect(),
            ),
        }
    }

    /// Check this state against a cell's declared layout and the batch size.
    ///
    /// A `Single` declaration only accepts a `Single` state; a `Multi` declaration
    /// only accepts a `Multi` state of the same length.
    pub fn validate(&self, size: &StateSize, batch_size: usize, context: &str) -> Result<()> {
        let layout_matches = matches!(
            (self, size),
            (Self::Single(_), StateSize::Single(_)) | (Self::Multi(_), StateSize::Multi(_))
        );
        if !layout_matches || self.arity() != size.arity() {
            return Err(NnError::shape_mismatch(
                format!("{context} (state arity)"),
                vec![size.arity()],
                vec![self.arity()],
            ));
        }

        for (index, (tensor, units)) in self.tensors().into_iter().zip(size.sizes()).enumerate() {
            let dims = tensor.dims();
            if dims != [batch_size, units] {
                return Err(NnError::shape_mismatch(
                    format!("{context} (state tensor {index})"),
                    vec![batch_size, units],
                    dims.to_vec(),
                ));
            }
        }
        Ok(())
    }
}

/// A single recurrence step.
///
/// Implementors declare their input width, output width and state layout; the
/// stacked processor uses these to validate a stack before running it.
pub trait RecurrentCell<B: Backend>: std::fmt::Debug {
    /// Width of the input feature vector.
    fn input_size(&self) -> usize;

    /// Width of the output feature vector.
    fn output_size(&self) -> usize;

    fn state_size(&self) -> StateSize;

    /// Compute one timestep.
    ///
    /// `input` is `[batch, input_size]`; `state` matches [`Self::state_size`].
    fn step(&self, input: Tensor<B, 2>, state: CellState<B>) -> (Tensor<B, 2>, CellState<B>);
}
