pub mod encoder;
pub mod filter;
pub mod impute;
pub mod pipeline;
pub mod power;
pub mod scaler;
pub mod split;
mod stats;

pub use encoder::*;
pub use filter::*;
pub use impute::*;
pub use pipeline::*;
pub use power::*;
pub use scaler::*;
pub use split::*;
