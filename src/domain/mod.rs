pub mod order;
pub mod outcome;

pub use order::*;
pub use outcome::*;
