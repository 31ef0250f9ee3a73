//! Game mechanics: dice and checks.

mod check;
mod dice;

pub use check::*;
pub use dice::*;
