pub mod platt;
pub mod svm;

pub use platt::*;
pub use svm::*;
