//! World simulation engine.
//!
//! This module implements the toroidal grid where populations of organisms
//! move, replicate, prey on each other and starve.

pub mod grid;
pub mod organism;
pub mod render;
pub mod runner;
pub mod simulation;

pub use grid::{Cell, World};
pub use organism::Organism;
pub use render::{render, Frame};
pub use runner::{FrameOptions, RunOptions, RunSummary, Runner};
pub use simulation::{PopulationFlow, Simulation, TickEngine, TickReport};
