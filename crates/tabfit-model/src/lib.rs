pub mod adapter;
pub mod hyperparameters;
pub mod kind;

pub use adapter::*;
pub use hyperparameters::*;
pub use kind::*;
