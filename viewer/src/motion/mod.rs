pub mod accumulator;
pub mod diff;
