#![deny(clippy::pedantic)]

#[macro_use]
extern crate contracts;

pub mod arrival;
pub mod genetic_map;
pub mod mutation;
pub mod rate_function;
pub mod rate_index;
pub mod reporter;
pub mod rng;
