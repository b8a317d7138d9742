//! Stateless layers operating on image batches.

pub mod cropping;

pub use cropping::{Cropping2D, Cropping2DConfig, CroppingArg, DataFormat};
