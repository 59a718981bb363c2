pub mod keys;
pub mod state;

pub use state::{Controller, ControllerSettings, Directive, StopReason};
