use argsim_core_bond::{ClosedUnitF64, NonNegativeF64};

use crate::{ancestry::AncestryRecord, leafset::Leafset, population::PopId};

/// Downstream consumer of finished ARG edges. Invoked once per inherited
/// branch, before the rosters change, with the intervals the branch carries
/// and its length in generations. It has no feedback into scheduling.
pub trait MutationPlacer {
    fn place_mutations(
        &mut self,
        intervals: &AncestryRecord,
        branch_length: NonNegativeF64,
        origin_generation: NonNegativeF64,
        pop: PopId,
    );

    /// Records the selected allele of a completed sweep on the leaves that
    /// inherited the causal site.
    fn place_causal_mutation(
        &mut self,
        leaves: &Leafset,
        generation: NonNegativeF64,
        pop: PopId,
        site: ClosedUnitF64,
    );
}
