//! # Recurrent Layers for Sequence Processing
//!
//! [`StackedRnn`] runs a stack of [`RecurrentCell`](crate::cells::RecurrentCell)s
//! over a batch of sequences, handling state initialization, threading and
//! (optionally) persistence across calls.
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | input | `[batch, time, features]` |
//! | mask | `[batch, time]` (bool) |
//! | output, `return_sequences = false` | `[batch, output_size]` |
//! | output, `return_sequences = true` | `[batch, time, output_size]` |
//!
//! ## Common Patterns
//!
//! ### Sequence classification (last output only)
//!
//! ```ignore
//! let mut rnn = StackedRnn::<Backend>::new(RnnConfig::new())
//!     .with_cell(GruCell::new(input_size, 64, &device));
//!
//! let result = rnn.forward(input, None, None)?;
//! let last = result.output.into_last(); // [batch, 64]
//! ```
//!
//! ### Explicit initial state
//!
//! ```ignore
//! let mut rnn = StackedRnn::<Backend>::new(RnnConfig::new().with_return_state(true))
//!     .with_cell(LstmCell::new(input_size, 32, &device));
//!
//! let first = rnn.forward(batch1, None, None)?;
//! let second = rnn.forward(batch2, first.final_state, None)?;
//! ```
//!
//! ### Stateful processing
//!
//! ```ignore
//! let mut rnn = StackedRnn::<Backend>::new(RnnConfig::new().with_stateful(true))
//!     .with_cell(SimpleRnnCell::new(input_size, 16, &device));
//!
//! rnn.forward(chunk1, None, None)?; // starts from zeros
//! rnn.forward(chunk2, None, None)?; // continues from chunk1's final state
//! rnn.reset_states();               // back to zeros
//! ```

pub mod stacked;

pub use stacked::{RnnConfig, RnnForward, RnnOutput, StackedRnn, StateBundle};
