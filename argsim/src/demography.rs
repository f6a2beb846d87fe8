use fnv::FnvHashMap;
use log::trace;

use argsim_core_bond::{ClosedOpenUnitF64, ClosedUnitF64, NonNegativeF64, PositiveF64};

use argsim_core::{
    ancestry::AncestryRecord,
    cogs::{GeneticMap, MutationPlacer, Rng},
    event::{EdgeChild, EdgeEvent, EdgeKind},
    leafset::Leafset,
    lineage::{Lineage, LineageId},
    population::PopId,
};
use argsim_impls::{arrival::ArrivalProcess, rate_index::RateIndex};

use crate::{migration::MigrationTable, pop::Pop, store::LineageStore};

/// Owner of the whole genealogical state: every pop, every active lineage,
/// the migration table, and the two Fenwick indexes over per-lineage
/// recombination and gene-conversion weights.
///
/// The four ARG operations mutate rosters and indexes atomically and push
/// their structural edges onto a deferred buffer; nothing external runs
/// mid-operation. The simulator drains the buffer once the operation has
/// returned.
pub struct Demography<G: GeneticMap, M: MutationPlacer> {
    map: G,
    placer: M,
    n_samples: u32,
    store: LineageStore,
    pops: Vec<Pop>,
    migrations: MigrationTable,
    recomb_index: RateIndex,
    gc_index: RateIndex,
    pending_edges: Vec<EdgeEvent>,
    // during a sweep: the causal site and, per sub-pop, a Fenwick tree over
    // roster positions weighing one-sided recombination
    sweep_site: Option<ClosedUnitF64>,
    side_indexes: FnvHashMap<PopId, RateIndex>,
}

impl<G: GeneticMap, M: MutationPlacer> Demography<G, M> {
    #[must_use]
    pub fn new(map: G, placer: M) -> Self {
        Self {
            map,
            placer,
            n_samples: 0,
            store: LineageStore::new(),
            pops: Vec::new(),
            migrations: MigrationTable::new(),
            recomb_index: RateIndex::new(),
            gc_index: RateIndex::new(),
            pending_edges: Vec::new(),
            sweep_site: None,
            side_indexes: FnvHashMap::default(),
        }
    }

    pub fn add_pop(&mut self, name: String, size: PositiveF64) -> PopId {
        #[allow(clippy::cast_possible_truncation)]
        let id = PopId::new(self.pops.len() as u32);

        self.pops.push(Pop::new(id, name, size));

        id
    }

    /// Creates `count` present-day sample lineages in `pop`.
    pub fn add_samples(&mut self, pop: PopId, count: u32) {
        for _ in 0..count {
            let sample = self.n_samples;
            self.n_samples += 1;

            self.create_lineage(pop, AncestryRecord::sample_leaf(sample), NonNegativeF64::zero());
        }
    }

    #[must_use]
    pub fn n_samples(&self) -> u32 {
        self.n_samples
    }

    #[must_use]
    pub fn map(&self) -> &G {
        &self.map
    }

    #[must_use]
    pub fn placer(&self) -> &M {
        &self.placer
    }

    #[must_use]
    pub fn pop(&self, id: PopId) -> &Pop {
        &self.pops[id.index()]
    }

    pub fn pop_mut(&mut self, id: PopId) -> &mut Pop {
        &mut self.pops[id.index()]
    }

    #[must_use]
    pub fn pops(&self) -> &[Pop] {
        &self.pops
    }

    #[must_use]
    pub fn lineage(&self, id: LineageId) -> &Lineage {
        self.store.get(id)
    }

    #[must_use]
    pub fn migrations(&self) -> &MigrationTable {
        &self.migrations
    }

    pub fn migrations_mut(&mut self) -> &mut MigrationTable {
        &mut self.migrations
    }

    #[must_use]
    pub fn all_rosters_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[must_use]
    pub fn active_lineages(&self) -> usize {
        self.store.len()
    }

    pub fn drain_edges(&mut self) -> Vec<EdgeEvent> {
        core::mem::take(&mut self.pending_edges)
    }

    pub fn place_causal_mutation(
        &mut self,
        leaves: &Leafset,
        generation: NonNegativeF64,
        pop: PopId,
        site: ClosedUnitF64,
    ) {
        self.placer.place_causal_mutation(leaves, generation, pop, site);
    }

    // ---- rate accounting ----------------------------------------------

    /// Sum over lineages of the genetic span a recombination can act on.
    #[must_use]
    pub fn recomb_weight_total(&self) -> f64 {
        self.recomb_index.total().max(0.0_f64)
    }

    /// Sum over lineages of their live genetic length.
    #[must_use]
    pub fn gc_weight_total(&self) -> f64 {
        self.gc_index.total().max(0.0_f64)
    }

    /// Total `k(k-1)/(4N)` over active pops without an installed arrival
    /// process.
    #[must_use]
    pub fn homogeneous_coal_rate_total(&self) -> f64 {
        self.pops
            .iter()
            .filter(|pop| pop.is_active())
            .map(|pop| pop.homogeneous_coal_rate().get())
            .sum()
    }

    #[must_use]
    pub fn migration_rate_total(&self) -> f64 {
        self.migrations
            .total_rate(|pop| self.pops[pop.index()].len())
            .get()
    }

    /// Resolves a point in `[0, homogeneous_coal_rate_total)` to its pop.
    #[must_use]
    pub fn pick_coal_pop(&self, target: f64) -> Option<PopId> {
        let mut remaining = target;
        let mut last = None;

        for pop in self.pops.iter().filter(|pop| pop.is_active()) {
            let rate = pop.homogeneous_coal_rate().get();

            if rate > 0.0_f64 {
                if remaining < rate {
                    return Some(pop.id());
                }

                last = Some(pop.id());
                remaining -= rate;
            }
        }

        last
    }

    /// Weighted draw of a lineage by recombination weight, with the
    /// residual genetic offset into its hull.
    #[must_use]
    pub fn sample_recomb_lineage(&self, fraction: ClosedOpenUnitF64) -> (LineageId, f64) {
        let (slot_plus_one, residue) = self.recomb_index.find_cumulative_fraction(fraction);

        (self.store.id_at_slot(slot_plus_one - 1), residue)
    }

    /// Weighted draw of a lineage by gene-conversion weight, with the
    /// residual genetic offset into its live material.
    #[must_use]
    pub fn sample_gc_lineage(&self, fraction: ClosedOpenUnitF64) -> (LineageId, f64) {
        let (slot_plus_one, residue) = self.gc_index.find_cumulative_fraction(fraction);

        (self.store.id_at_slot(slot_plus_one - 1), residue)
    }

    /// Independently recomputed recombination weight sum, for checking the
    /// index against the live lineages.
    #[must_use]
    pub fn recomputed_recomb_total(&self) -> f64 {
        self.store
            .iter()
            .map(|lineage| lineage.ancestry().hull_genetic_span(&self.map).get())
            .sum()
    }

    #[must_use]
    pub fn recomputed_gc_total(&self) -> f64 {
        self.store
            .iter()
            .map(|lineage| lineage.ancestry().live_genetic_length(&self.map).get())
            .sum()
    }

    // ---- the four ARG operations --------------------------------------

    /// Coalesces two uniformly chosen lineages of `pop` at generation `g`.
    #[debug_requires(self.pop(pop).len() >= 2, "coalescence needs a pair")]
    pub fn coalesce_roster_pair<R: Rng>(&mut self, pop: PopId, g: NonNegativeF64, rng: &mut R) {
        let roster = self.pops[pop.index()].roster();

        let first = rng.sample_index(roster.len());
        let mut second = rng.sample_index(roster.len() - 1);
        if second >= first {
            second += 1;
        }

        let (a, b) = (roster[first], roster[second]);

        self.coalesce_pair(pop, a, b, g);
    }

    /// Coalesces two explicitly chosen lineages of `pop` at generation
    /// `g`: charges both child branches, unions their ancestry, and
    /// inserts the parent unless the union fully coalesced away.
    pub fn coalesce_pair(&mut self, pop: PopId, a: LineageId, b: LineageId, g: NonNegativeF64) {
        let child_a = self.consume_lineage(a);
        let child_b = self.consume_lineage(b);

        self.charge_edge(child_a.ancestry(), child_a.birth_generation(), g, pop);
        self.charge_edge(child_b.ancestry(), child_b.birth_generation(), g, pop);

        let union = AncestryRecord::union(child_a.ancestry(), child_b.ancestry(), self.n_samples);

        let parents = match union {
            Some(ancestry) => vec![self.create_lineage(pop, ancestry, g)],
            None => Vec::new(),
        };

        trace!(
            "coalescence in pop {pop:?} at {g:?}: {:?} + {:?} -> {parents:?}",
            child_a.id(),
            child_b.id()
        );

        self.pending_edges.push(EdgeEvent {
            kind: EdgeKind::Coalescence,
            generation: g,
            pop,
            children: vec![Self::edge_child(&child_a), Self::edge_child(&child_b)],
            parents,
        });

        self.debug_check_rate_invariants();
    }

    /// Splits `lineage` at physical position `loc` into its two parents.
    /// Returns `false` without structural change when `loc` lies outside
    /// the lineage's hull.
    pub fn recombine(&mut self, lineage: LineageId, g: NonNegativeF64, loc: ClosedUnitF64) -> bool {
        let Some((left, right)) = self.store.get(lineage).ancestry().split_at(loc) else {
            return false;
        };

        let child = self.consume_lineage(lineage);
        let pop = child.pop();

        // each parent edge is charged with the child's branch over the
        // intervals that parent inherited
        self.charge_edge(&left, child.birth_generation(), g, pop);
        self.charge_edge(&right, child.birth_generation(), g, pop);

        let parent_left = self.create_lineage(pop, left, g);
        let parent_right = self.create_lineage(pop, right, g);

        trace!(
            "recombination of {:?} in pop {pop:?} at {g:?}, locus {loc:?}",
            child.id()
        );

        self.pending_edges.push(EdgeEvent {
            kind: EdgeKind::Recombination,
            generation: g,
            pop,
            children: vec![Self::edge_child(&child)],
            parents: vec![parent_left, parent_right],
        });

        self.debug_check_rate_invariants();

        true
    }

    /// Splits `lineage` into the conversion tract `[tract_beg, tract_end)`
    /// and its complement. Returns `false` without structural change
    /// unless both halves retain material.
    pub fn gene_convert(
        &mut self,
        lineage: LineageId,
        g: NonNegativeF64,
        tract_beg: ClosedUnitF64,
        tract_end: ClosedUnitF64,
    ) -> bool {
        let Some((inside, outside)) = self
            .store
            .get(lineage)
            .ancestry()
            .extract_tract(tract_beg, tract_end)
        else {
            return false;
        };

        let child = self.consume_lineage(lineage);
        let pop = child.pop();

        self.charge_edge(&inside, child.birth_generation(), g, pop);
        self.charge_edge(&outside, child.birth_generation(), g, pop);

        let parent_inside = self.create_lineage(pop, inside, g);
        let parent_outside = self.create_lineage(pop, outside, g);

        trace!(
            "gene conversion of {:?} in pop {pop:?} at {g:?}, tract [{tract_beg:?}, {tract_end:?})",
            child.id()
        );

        self.pending_edges.push(EdgeEvent {
            kind: EdgeKind::GeneConversion,
            generation: g,
            pop,
            children: vec![Self::edge_child(&child)],
            parents: vec![parent_inside, parent_outside],
        });

        self.debug_check_rate_invariants();

        true
    }

    /// Moves one uniformly chosen lineage of `from` into `to`.
    #[debug_requires(!self.pop(from).is_empty(), "migration needs a source lineage")]
    pub fn migrate_one<R: Rng>(
        &mut self,
        from: PopId,
        to: PopId,
        g: NonNegativeF64,
        rng: &mut R,
    ) {
        let roster = self.pops[from.index()].roster();
        let lineage = roster[rng.sample_index(roster.len())];

        trace!("migration of {lineage:?} from {from:?} to {to:?} at {g:?}");

        self.move_lineage(lineage, to);
    }

    /// Transfers a lineage between rosters. Recombination and
    /// gene-conversion weights are intrinsic to the ancestry and move with
    /// it; only the sweep side trees need re-syncing, which the roster
    /// bookkeeping does.
    pub fn move_lineage(&mut self, lineage: LineageId, to: PopId) {
        self.roster_detach(lineage);

        unsafe {
            self.store.get_mut(lineage).move_to_pop(to);
        }

        self.roster_attach(to, lineage);
    }

    // ---- sweep side trees ---------------------------------------------

    /// Installs the causal site and builds, for each given sub-pop, the
    /// Fenwick tree weighing one-sided recombination between the site and
    /// each lineage's hull.
    pub fn install_sweep_site(&mut self, site: ClosedUnitF64, pops: &[PopId]) {
        self.sweep_site = Some(site);

        for &pop in pops {
            let mut index = RateIndex::new();

            for (position, &lineage) in self.pops[pop.index()].roster().iter().enumerate() {
                let weight = self.side_weight(lineage);

                if weight > 0.0_f64 {
                    index.add(position + 1, weight);
                }
            }

            self.side_indexes.insert(pop, index);
        }
    }

    pub fn clear_sweep_site(&mut self) {
        self.sweep_site = None;
        self.side_indexes.clear();
    }

    #[must_use]
    pub fn side_weight_total(&self, pop: PopId) -> f64 {
        self.side_indexes
            .get(&pop)
            .map_or(0.0_f64, |index| index.total().max(0.0_f64))
    }

    /// Weighted draw of a lineage of `pop` by side weight.
    #[must_use]
    pub fn sample_side_lineage(&self, pop: PopId, fraction: ClosedOpenUnitF64) -> LineageId {
        let index = &self.side_indexes[&pop];
        let (position_plus_one, _residue) = index.find_cumulative_fraction(fraction);

        self.pops[pop.index()].roster()[position_plus_one - 1]
    }

    // ---- internals ----------------------------------------------------

    fn edge_child(lineage: &Lineage) -> EdgeChild {
        EdgeChild {
            lineage: lineage.id(),
            birth_generation: lineage.birth_generation(),
            intervals: lineage.ancestry().segs().to_vec(),
        }
    }

    fn charge_edge(
        &mut self,
        intervals: &AncestryRecord,
        birth: NonNegativeF64,
        g: NonNegativeF64,
        pop: PopId,
    ) {
        debug_assert!(g >= birth);

        let branch = unsafe { NonNegativeF64::new_unchecked((g.get() - birth.get()).max(0.0_f64)) };

        self.placer.place_mutations(intervals, branch, g, pop);
    }

    fn create_lineage(
        &mut self,
        pop: PopId,
        ancestry: AncestryRecord,
        g: NonNegativeF64,
    ) -> LineageId {
        let recomb_weight = ancestry.hull_genetic_span(&self.map);
        let gc_weight = ancestry.live_genetic_length(&self.map);

        let id = self.store.insert(|id| {
            Lineage::new(id, g, pop, ancestry, recomb_weight, gc_weight)
        });

        self.recomb_index.add(id.slot() + 1, recomb_weight.get());
        self.gc_index.add(id.slot() + 1, gc_weight.get());

        self.roster_attach(pop, id);

        id
    }

    fn consume_lineage(&mut self, id: LineageId) -> Lineage {
        self.roster_detach(id);

        let lineage = self.store.get(id);
        let (recomb_weight, gc_weight) = (lineage.recomb_weight(), lineage.gc_weight());

        self.recomb_index.add(id.slot() + 1, -recomb_weight.get());
        self.gc_index.add(id.slot() + 1, -gc_weight.get());

        self.store.remove(id)
    }

    fn roster_attach(&mut self, pop: PopId, id: LineageId) {
        let side_weight = if self.side_indexes.contains_key(&pop) {
            self.side_weight(id)
        } else {
            0.0_f64
        };

        let position = self.pops[pop.index()].roster_push(id);

        unsafe {
            self.store.get_mut(id).set_index_in_pop(position);
        }

        if let Some(index) = self.side_indexes.get_mut(&pop) {
            if side_weight > 0.0_f64 {
                index.add(position + 1, side_weight);
            }
        }
    }

    fn roster_detach(&mut self, id: LineageId) {
        let lineage = self.store.get(id);
        let pop = lineage.pop();
        let position = lineage.index_in_pop();

        let has_side = self.side_indexes.contains_key(&pop);
        let own_side_weight = if has_side { self.side_weight(id) } else { 0.0_f64 };

        let moved = self.pops[pop.index()].roster_swap_remove(position);

        unsafe {
            self.store.get_mut(id).remove_from_roster();
        }

        let moved_side_weight = match moved {
            Some(moved_id) => {
                let last_position = self.pops[pop.index()].len();
                let weight = if has_side { self.side_weight(moved_id) } else { 0.0_f64 };

                unsafe {
                    self.store.get_mut(moved_id).set_index_in_pop(position);
                }

                Some((last_position, weight))
            }
            None => None,
        };

        if let Some(index) = self.side_indexes.get_mut(&pop) {
            match moved_side_weight {
                Some((last_position, moved_weight)) => {
                    // the swapped-in entry takes over this position
                    index.add(position + 1, moved_weight - own_side_weight);
                    index.add(last_position + 1, -moved_weight);
                }
                None => index.add(position + 1, -own_side_weight),
            }
        }
    }

    /// Genetic length of the gap between the causal site and the nearer
    /// hull edge; zero when the hull covers the site, since recombination
    /// inside the hull is a real structural event instead.
    fn side_weight(&self, id: LineageId) -> f64 {
        let Some(site) = self.sweep_site else {
            return 0.0_f64;
        };

        let (hull_beg, hull_end) = self.store.get(id).ancestry().hull();

        if site <= hull_beg {
            self.map.physical_to_genetic(hull_beg).get() - self.map.physical_to_genetic(site).get()
        } else if site >= hull_end {
            self.map.physical_to_genetic(site).get() - self.map.physical_to_genetic(hull_end).get()
        } else {
            0.0_f64
        }
    }

    fn debug_check_rate_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            let tolerance = 1.0e-6 * self.recomputed_recomb_total().max(1.0_f64);

            debug_assert!(
                (self.recomb_weight_total() - self.recomputed_recomb_total()).abs() < tolerance,
                "recombination index total diverged from the live lineages"
            );
            debug_assert!(
                (self.gc_weight_total() - self.recomputed_gc_total()).abs() < tolerance,
                "gene-conversion index total diverged from the live lineages"
            );
        }
    }
}

impl<G: GeneticMap, M: MutationPlacer> Demography<G, M> {
    /// Installs a time-varying coalescence process on `pop`, replacing its
    /// homogeneous rate until cleared.
    pub fn set_coal_process(&mut self, pop: PopId, process: ArrivalProcess) {
        self.pops[pop.index()].set_coal_process(process);
    }

    pub fn clear_coal_process(&mut self, pop: PopId) {
        self.pops[pop.index()].clear_coal_process();
    }
}
