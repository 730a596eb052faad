pub mod config;
pub mod grid;
pub mod harness;
pub mod report;
pub mod state;
pub mod tuning;

pub use config::*;
pub use grid::*;
pub use harness::*;
pub use report::*;
pub use state::*;
pub use tuning::*;
