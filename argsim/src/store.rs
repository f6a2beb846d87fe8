use slab::Slab;

use argsim_core::lineage::{Lineage, LineageId};

/// Arena of all currently active lineages. Slots are reused, but every
/// insertion stamps a fresh tag into the issued `LineageId`, so holding a
/// reference to a consumed lineage is detectable instead of silently
/// resolving to whatever reused its slot.
#[derive(Debug, Default)]
pub struct LineageStore {
    arena: Slab<Lineage>,
    next_tag: u32,
}

impl LineageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Allocates a slot and hands its id to `make` so the lineage can be
    /// constructed knowing its own identity.
    pub fn insert(&mut self, make: impl FnOnce(LineageId) -> Lineage) -> LineageId {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);

        let entry = self.arena.vacant_entry();

        #[allow(clippy::cast_possible_truncation)]
        let id = LineageId::new(entry.key() as u32, tag);

        let lineage = make(id);
        debug_assert!(lineage.id() == id);
        entry.insert(lineage);

        id
    }

    #[must_use]
    pub fn get(&self, id: LineageId) -> &Lineage {
        let lineage = &self.arena[id.slot()];
        debug_assert!(lineage.id() == id, "stale lineage reference {id:?}");
        lineage
    }

    #[must_use]
    pub fn get_mut(&mut self, id: LineageId) -> &mut Lineage {
        let lineage = &mut self.arena[id.slot()];
        debug_assert!(lineage.id() == id, "stale lineage reference {id:?}");
        lineage
    }

    /// The id currently occupying `slot`, for resolving weighted draws
    /// from the rate indexes (which are keyed by slot).
    #[must_use]
    pub fn id_at_slot(&self, slot: usize) -> LineageId {
        self.arena[slot].id()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lineage> {
        self.arena.iter().map(|(_, lineage)| lineage)
    }

    pub fn remove(&mut self, id: LineageId) -> Lineage {
        debug_assert!(self.arena[id.slot()].id() == id, "stale lineage reference {id:?}");

        self.arena.remove(id.slot())
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::NonNegativeF64;

    use argsim_core::{ancestry::AncestryRecord, lineage::Lineage, population::PopId};

    use super::LineageStore;

    fn leaf(store: &mut LineageStore, sample: u32) -> argsim_core::lineage::LineageId {
        store.insert(|id| {
            Lineage::new(
                id,
                NonNegativeF64::zero(),
                PopId::new(0),
                AncestryRecord::sample_leaf(sample),
                NonNegativeF64::try_from(1.0).unwrap(),
                NonNegativeF64::try_from(1.0).unwrap(),
            )
        })
    }

    #[test]
    fn reused_slots_issue_fresh_tags() {
        let mut store = LineageStore::new();

        let first = leaf(&mut store, 0);
        store.remove(first);

        let second = leaf(&mut store, 1);

        assert_eq!(first.slot(), second.slot());
        assert_ne!(first.tag(), second.tag());
        assert_eq!(store.get(second).id(), second);
        assert_eq!(store.id_at_slot(second.slot()), second);
    }

    #[test]
    #[should_panic(expected = "stale lineage reference")]
    #[cfg(debug_assertions)]
    fn stale_references_are_caught_in_debug_builds() {
        let mut store = LineageStore::new();

        let first = leaf(&mut store, 0);
        store.remove(first);
        let _second = leaf(&mut store, 1);

        let _ = store.get(first);
    }
}
