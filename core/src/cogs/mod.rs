mod genetic_map;
mod mutation;
mod rng;

pub use genetic_map::GeneticMap;
pub use mutation::MutationPlacer;
pub use rng::{Rng, RngCore};
