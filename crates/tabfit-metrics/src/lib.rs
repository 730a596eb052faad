pub mod catalog;
pub mod classification;
pub mod regression;

pub use catalog::*;
pub use classification::*;
pub use regression::*;
