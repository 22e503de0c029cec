//! A small handwritten digit classifier: a two-layer perceptron trained with Adam on top of
//! `burn`'s tensors and automatic differentiation.

pub mod context;
pub mod dataloader;
pub mod datasets;
pub mod loss;
pub mod nn;
pub mod plot;
pub mod train;
