//! Control plane: the adaptive jitter controller and the stats sampler
//! that drives it.

pub mod adaptive;
pub mod stats;

pub use adaptive::{AdaptiveController, StepResult, WindowDeltas};
