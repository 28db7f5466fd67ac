//! Core types, configuration and randomness for the ecosystem simulator.

pub mod types;
pub mod config;
pub mod error;
pub mod rng;

pub use error::{ConfigIssue, Error, Result};
pub use types::*;
pub use config::*;
pub use rng::{combination, SimRng, UniformSource};
