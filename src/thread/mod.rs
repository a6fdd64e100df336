//! Thread handles, turn aggregation, and bounded concurrent turns.

mod aggregator;
mod multi;
mod runner;

pub use aggregator::*;
pub use multi::*;
pub use runner::*;
