//! Stacked RNN example
//!
//! Runs a SimpleRNN -> GRU -> LSTM stack over random sequences and shows the
//! output layouts, stateful processing and masking.
//!
//! Run with `RUST_LOG=cellstack=trace` to see the per-call tracing output.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use cellstack::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

type Backend = NdArray<f32>;

fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "cellstack=debug".parse() {
        filter = filter.add_directive(directive);
    }
    fmt().with_env_filter(filter).init();
}

fn stack(config: RnnConfig, device: &NdArrayDevice) -> StackedRnn<Backend> {
    StackedRnn::new(config)
        .with_cell(SimpleRnnCell::new(8, 16, device))
        .with_cell(GruCell::new(16, 16, device))
        .with_cell(LstmCell::new(16, 4, device))
}

fn main() -> Result<()> {
    init_logging();
    println!("=== Stacked RNN Example ===\n");

    let device = Default::default();

    // Input shape: [batch=2, seq=6, features=8]
    let input = Tensor::<Backend, 3>::random([2, 6, 8], Distribution::Uniform(-1.0, 1.0), &device);

    // Example 1: last output only
    println!("Example 1: Last timestep only");
    let mut rnn = stack(RnnConfig::new(), &device);
    let result = rnn.forward(input.clone(), None, None)?;
    println!("  Cells:        {}", rnn.num_cells());
    println!("  State sizes:  {:?}", rnn.state_sizes());
    println!("  Output shape: {:?}", result.output.dims());
    println!();

    // Example 2: full sequence plus final states
    println!("Example 2: Sequences and states");
    let mut rnn = stack(
        RnnConfig::new()
            .with_return_sequences(true)
            .with_return_state(true),
        &device,
    );
    let result = rnn.forward(input.clone(), None, None)?;
    println!("  Output shape: {:?}", result.output.dims());
    if let Some(states) = &result.final_state {
        for (index, state) in states.iter().enumerate() {
            let dims: Vec<[usize; 2]> = state.tensors().iter().map(|t| t.dims()).collect();
            println!("  Cell {index} state: {dims:?}");
        }
    }
    println!();

    // Example 3: stateful processing of consecutive chunks
    println!("Example 3: Stateful chunks");
    let mut rnn = stack(RnnConfig::new().with_stateful(true), &device);
    for chunk in 0..3 {
        let output = rnn.forward(input.clone(), None, None)?.output;
        let norm: f32 = output
            .into_last()
            .map(|last| last.powf_scalar(2.0).sum().into_scalar())
            .unwrap_or_default();
        println!("  Chunk {chunk}: squared output norm {norm:.4}");
    }
    rnn.reset_states();
    println!("  State reset, persisted: {}", rnn.states().is_some());
    println!();

    // Example 4: masking the padded tail of the second sample
    println!("Example 4: Masking");
    let mask = Tensor::<Backend, 2>::from_floats(
        [[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], [1.0, 1.0, 1.0, 0.0, 0.0, 0.0]],
        &device,
    )
    .greater_elem(0.5);
    let mut rnn = stack(
        RnnConfig::new()
            .with_return_sequences(true)
            .with_zero_output_for_mask(true),
        &device,
    );
    let result = rnn.forward(input, None, Some(mask))?;
    println!("  Output shape: {:?}", result.output.dims());
    println!("  Padded steps of sample 1 are emitted as zeros");

    Ok(())
}
