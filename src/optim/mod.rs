//! Optimizers updating [`Variable`]s from gradients.
//!
//! Gradients come from outside (typically burn's autodiff backend); an optimizer
//! only applies its update rule. Every step runs in the same order:
//!
//! 1. gradients are checked against their variables' shapes,
//! 2. gradients are clipped ([`GradientClipping`]),
//! 3. weight decay shrinks the variables not excluded from it,
//! 4. the optimizer-specific update is applied.
//!
//! # Example
//!
//! ```ignore
//! use cellstack::optim::{AdadeltaConfig, Optimizer, Variable};
//!
//! let mut optimizer = AdadeltaConfig::new().with_learning_rate(1.0).init::<Backend>()?;
//! let mut weights = Variable::new("kernel", weights_tensor);
//!
//! optimizer.apply_gradients(vec![(gradient, &mut weights)])?;
//!
//! // Variables of different ranks go through one call as `GradientPair`s.
//! optimizer.apply_gradients([
//!     GradientPair::new(kernel_grad, &mut kernel),
//!     GradientPair::new(bias_grad, &mut bias),
//! ])?;
//! ```

pub mod adadelta;
pub mod clipping;
pub mod variable;

pub use adadelta::{Adadelta, AdadeltaConfig};
pub use clipping::GradientClipping;
pub use variable::{Trainable, Variable};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::Result;

/// A gradient bound to the variable it updates, with the rank erased.
///
/// Built from a `(gradient, &mut variable)` tuple or with [`GradientPair::new`].
/// The gradient keeps its original shape so mismatches can be reported.
pub struct GradientPair<'a, B: Backend> {
    gradient: Tensor<B, 1>,
    shape: Vec<usize>,
    variable: &'a mut dyn Trainable<B>,
}

impl<'a, B: Backend> GradientPair<'a, B> {
    pub fn new<const D: usize>(gradient: Tensor<B, D>, variable: &'a mut Variable<B, D>) -> Self {
        let shape = gradient.dims().to_vec();
        let num_elements = shape.iter().product::<usize>();
        Self {
            gradient: gradient.reshape([num_elements]),
            shape,
            variable,
        }
    }

    /// Shape of the gradient as it was given.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn variable(&self) -> &dyn Trainable<B> {
        &*self.variable
    }

    pub fn into_parts(self) -> (Tensor<B, 1>, &'a mut dyn Trainable<B>) {
        (self.gradient, self.variable)
    }
}

impl<'a, B: Backend, const D: usize> From<(Tensor<B, D>, &'a mut Variable<B, D>)>
    for GradientPair<'a, B>
{
    fn from((gradient, variable): (Tensor<B, D>, &'a mut Variable<B, D>)) -> Self {
        Self::new(gradient, variable)
    }
}

/// Core trait for optimizers.
pub trait Optimizer<B: Backend> {
    /// Apply one update step to each `(gradient, variable)` pair.
    ///
    /// Pairs may mix variable ranks. Fails without touching any variable if a
    /// gradient's shape differs from its variable's.
    fn apply_gradients<'a, I>(&mut self, grads_and_vars: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<GradientPair<'a, B>>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Number of steps applied so far.
    fn iterations(&self) -> u64;
}
