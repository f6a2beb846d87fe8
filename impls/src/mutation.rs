use argsim_core_bond::{ClosedUnitF64, NonNegativeF64};

use argsim_core::{
    ancestry::AncestryRecord,
    cogs::{MutationPlacer, Rng},
    leafset::Leafset,
    population::PopId,
};

use crate::rng::SeededRng;

pub struct NullMutationPlacer;

impl MutationPlacer for NullMutationPlacer {
    fn place_mutations(
        &mut self,
        _intervals: &AncestryRecord,
        _branch_length: NonNegativeF64,
        _origin_generation: NonNegativeF64,
        _pop: PopId,
    ) {
    }

    fn place_causal_mutation(
        &mut self,
        _leaves: &Leafset,
        _generation: NonNegativeF64,
        _pop: PopId,
        _site: ClosedUnitF64,
    ) {
    }
}

/// The selected allele of a completed sweep, recorded on the leaves that
/// inherited the causal site.
#[derive(Debug, Clone)]
pub struct CausalMutation {
    pub generation: NonNegativeF64,
    pub pop: PopId,
    pub site: ClosedUnitF64,
    pub leaves: Leafset,
}

/// Drops Poisson-count neutral mutations on every charged edge and keeps
/// the causal mutations of completed sweeps.
///
/// Placement draws come from the placer's own seeded stream, so observing
/// mutations never perturbs the engine's event sequence.
#[allow(clippy::module_name_repetitions)]
pub struct PoissonMutationPlacer {
    mutation_rate: NonNegativeF64,
    rng: SeededRng,
    mutation_count: usize,
    total_charged_length: f64,
    causal: Vec<CausalMutation>,
}

impl PoissonMutationPlacer {
    #[must_use]
    pub fn new(mutation_rate: NonNegativeF64, seed: u64) -> Self {
        Self {
            mutation_rate,
            rng: SeededRng::from_seed(seed),
            mutation_count: 0,
            total_charged_length: 0.0_f64,
            causal: Vec::new(),
        }
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutation_count
    }

    /// Total charged edge length, in generations weighted by the physical
    /// fraction of live material.
    #[must_use]
    pub fn total_charged_length(&self) -> f64 {
        self.total_charged_length
    }

    #[must_use]
    pub fn causal_mutations(&self) -> &[CausalMutation] {
        &self.causal
    }
}

impl MutationPlacer for PoissonMutationPlacer {
    fn place_mutations(
        &mut self,
        intervals: &AncestryRecord,
        branch_length: NonNegativeF64,
        _origin_generation: NonNegativeF64,
        _pop: PopId,
    ) {
        let live_span: f64 = intervals
            .segs()
            .iter()
            .map(|seg| seg.end.get() - seg.beg.get())
            .sum();

        let charged = branch_length.get() * live_span;

        self.total_charged_length += charged;
        self.mutation_count += self.rng.sample_poisson(self.mutation_rate.get() * charged);
    }

    fn place_causal_mutation(
        &mut self,
        leaves: &Leafset,
        generation: NonNegativeF64,
        pop: PopId,
        site: ClosedUnitF64,
    ) {
        self.causal.push(CausalMutation {
            generation,
            pop,
            site,
            leaves: leaves.clone(),
        });
    }
}
