use rand::{rngs::StdRng, Rng as _, SeedableRng};

use argsim_core::cogs::RngCore;

/// The run's single source of randomness, reproducible from its seed.
pub struct SeededRng(StdRng);

impl SeededRng {
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

#[contract_trait]
impl RngCore for SeededRng {
    fn sample_uniform(&mut self) -> f64 {
        self.0.gen_range(0.0_f64..1.0_f64)
    }
}
