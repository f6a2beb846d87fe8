#![deny(clippy::pedantic)]

#[macro_use]
extern crate contracts;

pub mod ancestry;
pub mod cogs;
pub mod event;
pub mod leafset;
pub mod lineage;
pub mod population;
pub mod reporter;
