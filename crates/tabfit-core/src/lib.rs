pub mod dataset;
pub mod error;
pub mod matrix;

pub use dataset::{Column, ColumnData, ColumnKind, Dataset, DatasetBuilder, Value};
pub use error::{TabError, TabResult};
pub use matrix::{squared_distance, Matrix};
