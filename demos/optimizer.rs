//! Adadelta example
//!
//! Minimizes `sum((x - target)^2)` with hand-computed gradients, once plain and
//! once with weight decay and gradient clipping.

use burn::backend::NdArray;
use burn::tensor::Tensor;
use cellstack::optim::{AdadeltaConfig, Optimizer, Variable};
use cellstack::Result;
use tracing_subscriber::{fmt, EnvFilter};

type Backend = NdArray<f32>;

fn loss(x: &Tensor<Backend, 1>, target: &Tensor<Backend, 1>) -> f32 {
    (x.clone() - target.clone()).powf_scalar(2.0).sum().into_scalar()
}

fn train(config: AdadeltaConfig, steps: usize) -> Result<()> {
    let device = Default::default();
    let target = Tensor::<Backend, 1>::from_floats([3.0, -2.0, 0.5, 1.0], &device);
    let mut x = Variable::new("x", Tensor::<Backend, 1>::zeros([4], &device));
    let mut optimizer = config.init::<Backend>()?;

    for step in 0..steps {
        let gradient = (x.value().clone() - target.clone()) * 2.0;
        optimizer.apply_gradients(vec![(gradient, &mut x)])?;
        if step % (steps / 5).max(1) == 0 {
            println!("  step {step:>4}: loss {:.5}", loss(x.value(), &target));
        }
    }
    println!("  final loss {:.5} after {} iterations", loss(x.value(), &target), optimizer.iterations());
    Ok(())
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    println!("=== Adadelta Example ===\n");

    println!("Plain Adadelta (lr = 1.0)");
    train(AdadeltaConfig::new().with_learning_rate(1.0), 500)?;
    println!();

    println!("With weight decay and global norm clipping");
    train(
        AdadeltaConfig::new()
            .with_learning_rate(1.0)
            .with_weight_decay(Some(0.01))
            .with_global_clipnorm(Some(1.0)),
        500,
    )?;

    Ok(())
}
