//! Filter evaluation: first filter whose predicates all pass wins.

mod matcher;
mod types;

pub use matcher::find_match;
pub use types::*;
