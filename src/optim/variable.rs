use std::sync::atomic::{AtomicU64, Ordering};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

/// A named, mutable tensor updated by an optimizer.
///
/// Every variable gets a process-unique id on creation; optimizers key their
/// per-variable slots by it. Cloning yields a new variable with its own id, so
/// a copy never shares optimizer state with the original.
#[derive(Debug)]
pub struct Variable<B: Backend, const D: usize> {
    id: u64,
    name: String,
    value: Tensor<B, D>,
}

impl<B: Backend, const D: usize> Variable<B, D> {
    pub fn new(name: impl Into<String>, value: Tensor<B, D>) -> Self {
        Self {
            id: NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            value,
        }
    }

    /// A variable named `"variable"`.
    pub fn unnamed(value: Tensor<B, D>) -> Self {
        Self::new("variable", value)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Tensor<B, D> {
        &self.value
    }

    pub fn dims(&self) -> [usize; D] {
        self.value.dims()
    }

    pub fn assign(&mut self, value: Tensor<B, D>) {
        self.value = value;
    }

    pub fn into_value(self) -> Tensor<B, D> {
        self.value
    }
}

impl<B: Backend, const D: usize> Clone for Variable<B, D> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone(), self.value.clone())
    }
}

/// Rank-erased view of a [`Variable`], used by optimizers that update
/// variables of different ranks in one call.
pub trait Trainable<B: Backend> {
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    fn shape(&self) -> Vec<usize>;

    /// The value flattened to rank 1.
    fn flat_value(&self) -> Tensor<B, 1>;

    /// Replace the value from a flat tensor with the same number of elements.
    fn assign_flat(&mut self, values: Tensor<B, 1>);
}

impl<B: Backend, const D: usize> Trainable<B> for Variable<B, D> {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> Vec<usize> {
        self.dims().to_vec()
    }

    fn flat_value(&self) -> Tensor<B, 1> {
        let num_elements = self.dims().iter().product::<usize>();
        self.value.clone().reshape([num_elements])
    }

    fn assign_flat(&mut self, values: Tensor<B, 1>) {
        self.value = values.reshape(self.dims());
    }
}
