use core::fmt;

use argsim_core_bond::NonNegativeF64;
use serde::{Deserialize, Serialize};

use crate::{ancestry::AncestryRecord, population::PopId};

/// Generational reference to a lineage: the arena slot plus the tag the
/// slot carried when this lineage was created. A stale id (slot reused by
/// a later lineage) never silently resolves to the wrong lineage.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageId {
    slot: u32,
    tag: u32,
}

impl fmt::Debug for LineageId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "LineageId({}v{})", self.slot, self.tag)
    }
}

impl LineageId {
    /// Should only be constructed by the `LineageStore` issuing it.
    #[must_use]
    pub fn new(slot: u32, tag: u32) -> Self {
        Self { slot, tag }
    }

    #[must_use]
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    #[must_use]
    pub fn tag(self) -> u32 {
        self.tag
    }
}

/// One ancestral chromosome active at some point in backward time.
///
/// The rate weights cache the genetic lengths over which a recombination
/// resp. gene conversion remains informative for this lineage; they are
/// fixed at creation because the ancestry of a live lineage never changes.
#[derive(Debug)]
pub struct Lineage {
    id: LineageId,
    birth_generation: NonNegativeF64,
    pop: PopId,
    index_in_pop: usize,
    ancestry: AncestryRecord,
    recomb_weight: NonNegativeF64,
    gc_weight: NonNegativeF64,
}

impl Lineage {
    const UNROSTERED: usize = usize::MAX;

    #[must_use]
    pub fn new(
        id: LineageId,
        birth_generation: NonNegativeF64,
        pop: PopId,
        ancestry: AncestryRecord,
        recomb_weight: NonNegativeF64,
        gc_weight: NonNegativeF64,
    ) -> Self {
        Self {
            id,
            birth_generation,
            pop,
            index_in_pop: Self::UNROSTERED,
            ancestry,
            recomb_weight,
            gc_weight,
        }
    }

    #[must_use]
    pub fn id(&self) -> LineageId {
        self.id
    }

    #[must_use]
    pub fn birth_generation(&self) -> NonNegativeF64 {
        self.birth_generation
    }

    #[must_use]
    pub fn pop(&self) -> PopId {
        self.pop
    }

    #[must_use]
    pub fn is_rostered(&self) -> bool {
        self.index_in_pop != Self::UNROSTERED
    }

    #[must_use]
    pub fn index_in_pop(&self) -> usize {
        debug_assert!(self.is_rostered());

        self.index_in_pop
    }

    #[must_use]
    pub fn ancestry(&self) -> &AncestryRecord {
        &self.ancestry
    }

    #[must_use]
    pub fn into_ancestry(self) -> AncestryRecord {
        self.ancestry
    }

    #[must_use]
    pub fn recomb_weight(&self) -> NonNegativeF64 {
        self.recomb_weight
    }

    #[must_use]
    pub fn gc_weight(&self) -> NonNegativeF64 {
        self.gc_weight
    }

    /// # Safety
    /// This method should only be called by internal `Demography` roster
    /// code to keep the cached position in sync with the owning roster.
    #[debug_ensures(self.index_in_pop() == old(index), "updates the roster position")]
    pub unsafe fn set_index_in_pop(&mut self, index: usize) {
        debug_assert!(index != Self::UNROSTERED);

        self.index_in_pop = index;
    }

    /// # Safety
    /// This method should only be called by internal `Demography` roster
    /// code while a lineage is mid-transfer between rosters.
    #[debug_requires(!self.is_rostered(), "lineage must be off-roster to move")]
    #[debug_ensures(self.pop() == old(pop), "updates the owning pop")]
    pub unsafe fn move_to_pop(&mut self, pop: PopId) {
        self.pop = pop;
    }

    /// # Safety
    /// This method should only be called by internal `Demography` roster
    /// code when the lineage leaves its roster.
    #[debug_requires(self.is_rostered(), "lineage must be rostered to be removed")]
    #[debug_ensures(!self.is_rostered(), "lineage has left its roster")]
    pub unsafe fn remove_from_roster(&mut self) {
        self.index_in_pop = Self::UNROSTERED;
    }
}
