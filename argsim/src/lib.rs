#![deny(clippy::pedantic)]

#[macro_use]
extern crate contracts;

pub mod demography;
pub mod historical;
pub mod migration;
pub mod model;
pub mod pop;
pub mod simulator;
pub mod store;
pub mod sweep;

pub use model::{Model, ModelBuilder, ModelError};
pub use simulator::{SimulationError, Simulator};
