//! # cellstack - stacked recurrent cells on Burn
//!
//! Recurrent building blocks for the Burn framework, centered on running a stack
//! of recurrent cells over a sequence as if they were one cell.
//!
//! ## Features
//!
//! - **StackedRnn**: cascades a list of cells at every timestep, with optional
//!   sequence outputs, returned states, stateful carry-over, reversed
//!   processing and masking
//! - **Cells**: SimpleRNN, GRU and LSTM, plus a [`cells::RecurrentCell`] trait
//!   for custom cells with one or several state tensors
//! - **Cropping2D**: spatial cropping for channels-last and channels-first images
//! - **Adadelta**: optimizer with gradient clipping and decoupled weight decay
//!
//! ## Quick Start
//!
//! ```ignore
//! use cellstack::prelude::*;
//!
//! let mut rnn = StackedRnn::<Backend>::new(RnnConfig::new().with_return_sequences(true))
//!     .with_cell(SimpleRnnCell::new(4, 8, &device))
//!     .with_cell(LstmCell::new(8, 2, &device));
//!
//! // input: [batch, timesteps, features]
//! let out = rnn.forward(input, None, None)?;
//! let sequence = out.output.into_sequence(); // [batch, timesteps, 2]
//! ```
//!
//! The backend is chosen by the caller through the `B: Backend` type parameter;
//! nothing in this crate depends on a concrete backend.

pub mod activation;
pub mod cells;
pub mod error;
pub mod layers;
pub mod optim;
pub mod rnn;

pub use error::{NnError, Result};

pub mod prelude {
    pub use crate::activation::{Activation, LeCun};
    pub use crate::cells::{
        CellState, GruCell, GruCellConfig, LstmCell, LstmCellConfig, RecurrentCell, SimpleRnnCell,
        SimpleRnnCellConfig, StateSize,
    };
    pub use crate::error::{NnError, Result};
    pub use crate::layers::{Cropping2D, Cropping2DConfig, DataFormat};
    pub use crate::optim::{
        Adadelta, AdadeltaConfig, GradientClipping, GradientPair, Optimizer, Trainable, Variable,
    };
    pub use crate::rnn::{RnnConfig, RnnForward, RnnOutput, StackedRnn, StateBundle};
}
