use argsim_core_bond::{NonNegativeF64, PositiveF64};

use argsim_core::{lineage::LineageId, population::PopId};
use argsim_impls::arrival::ArrivalProcess;

/// One deme: a roster of active lineages, a declared size, and optionally
/// an installed time-varying coalescence arrival process. While a process
/// is installed the pop contributes nothing to the homogeneous
/// coalescence rate; the process is sampled instead.
///
/// Pops are deactivated, never deleted, so recorded ids stay resolvable.
#[derive(Debug)]
pub struct Pop {
    id: PopId,
    name: String,
    size: PositiveF64,
    roster: Vec<LineageId>,
    coal_process: Option<ArrivalProcess>,
    active: bool,
}

impl Pop {
    #[must_use]
    pub fn new(id: PopId, name: String, size: PositiveF64) -> Self {
        Self {
            id,
            name,
            size,
            roster: Vec::new(),
            coal_process: None,
            active: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> PopId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn size(&self) -> PositiveF64 {
        self.size
    }

    pub fn set_size(&mut self, size: PositiveF64) {
        self.size = size;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        debug_assert!(self.roster.is_empty(), "only empty pops are deactivated");

        self.active = false;
    }

    #[must_use]
    pub fn roster(&self) -> &[LineageId] {
        &self.roster
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    #[must_use]
    pub fn coal_process(&self) -> Option<&ArrivalProcess> {
        self.coal_process.as_ref()
    }

    pub fn set_coal_process(&mut self, process: ArrivalProcess) {
        self.coal_process = Some(process);
    }

    pub fn clear_coal_process(&mut self) {
        self.coal_process = None;
    }

    /// `k(k-1) / (4N)`: the constant-size coalescence rate of the roster.
    /// Zero while an arrival process is installed, since the process
    /// replaces the homogeneous rate.
    #[must_use]
    pub fn homogeneous_coal_rate(&self) -> NonNegativeF64 {
        if self.coal_process.is_some() {
            return NonNegativeF64::zero();
        }

        self.pair_rate()
    }

    /// `k(k-1) / (4N)` regardless of an installed process.
    #[must_use]
    pub fn pair_rate(&self) -> NonNegativeF64 {
        #[allow(clippy::cast_precision_loss)]
        let pairs = (self.roster.len() * self.roster.len().saturating_sub(1)) as f64;

        unsafe { NonNegativeF64::new_unchecked(pairs / (4.0_f64 * self.size.get())) }
    }

    /// `k(k-1)`, the factor an installed coalescence process is scaled by.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.roster.len() * self.roster.len().saturating_sub(1)
    }

    pub(crate) fn roster_push(&mut self, lineage: LineageId) -> usize {
        self.roster.push(lineage);

        self.roster.len() - 1
    }

    /// Removes the roster entry at `index`; returns the id that was moved
    /// into its place, if any, so the caller can re-sync cached positions.
    pub(crate) fn roster_swap_remove(&mut self, index: usize) -> Option<LineageId> {
        self.roster.swap_remove(index);

        self.roster.get(index).copied()
    }
}
