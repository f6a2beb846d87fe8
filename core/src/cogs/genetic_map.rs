use argsim_core_bond::ClosedUnitF64;

/// Bijection between physical position and cumulative genetic fraction over
/// the simulated region, both normalized to the unit interval. Scaling to
/// events per generation happens in the caller.
///
/// Implementations must be monotone so that
/// `genetic_to_physical(physical_to_genetic(p)) == p` up to rounding.
pub trait GeneticMap {
    #[must_use]
    fn physical_to_genetic(&self, pos: ClosedUnitF64) -> ClosedUnitF64;

    #[must_use]
    fn genetic_to_physical(&self, gpos: ClosedUnitF64) -> ClosedUnitF64;
}
