use argsim_core_bond::ClosedOpenUnitF64;

/// Fenwick / partial-sum tree mapping lineage slots to non-negative rate
/// contributions, with O(log n) update and O(log n) weighted sampling.
///
/// Slot 0 is reserved and fixed at zero; capacity is a power of two and
/// doubles on demand. Doubling only has to extend the array with zeros and
/// seed the new root from the old one, since the old root already carries
/// the full prefix sum.
#[derive(Debug, Clone)]
pub struct RateIndex {
    // tree[0] is unused; tree[capacity] is the total
    tree: Vec<f64>,
    capacity: usize,
}

impl Default for RateIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RateIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: vec![0.0_f64; 2],
            capacity: 1,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.tree[self.capacity]
    }

    /// Adjusts slot `index`'s weight by `delta`.
    #[debug_requires(index >= 1, "slot 0 is reserved")]
    #[debug_ensures(self.weight(old(index)) >= -1.0e-9, "weights stay non-negative")]
    pub fn add(&mut self, index: usize, delta: f64) {
        self.ensure_capacity(index);

        let mut node = index;

        while node <= self.capacity {
            self.tree[node] += delta;
            node += node & node.wrapping_neg();
        }
    }

    /// Finds `(index, residue)` such that the cumulative weight through
    /// `index - 1` is at most `fraction * total`, which in turn is below
    /// the cumulative weight through `index`; `residue` is the overshoot
    /// past `index - 1`.
    ///
    /// Must not be called while the total is zero.
    #[debug_requires(self.total() > 0.0_f64, "a zero total cannot be sampled from")]
    #[debug_ensures(ret.0 >= 1 && ret.0 <= self.capacity())]
    #[debug_ensures(ret.1 >= 0.0_f64)]
    #[must_use]
    pub fn find_cumulative_fraction(&self, fraction: ClosedOpenUnitF64) -> (usize, f64) {
        let mut target = fraction.get() * self.total();

        // top-down binary descent over the tree levels: after each level,
        // `position` is the largest index known to satisfy
        // cumulative(position) <= target
        let mut position = 0_usize;
        let mut bitmask = self.capacity;

        while bitmask > 0 {
            let next = position + bitmask;

            if next <= self.capacity && self.tree[next] <= target {
                target -= self.tree[next];
                position = next;
            }

            bitmask >>= 1;
        }

        (position + 1, target)
    }

    /// The current weight of one slot, recomputed from prefix sums.
    #[must_use]
    pub fn weight(&self, index: usize) -> f64 {
        self.prefix(index) - self.prefix(index - 1)
    }

    /// Cumulative weight through `index`.
    #[must_use]
    pub fn prefix(&self, index: usize) -> f64 {
        let mut sum = 0.0_f64;
        let mut node = index.min(self.capacity);

        while node > 0 {
            sum += self.tree[node];
            node -= node & node.wrapping_neg();
        }

        sum
    }

    fn ensure_capacity(&mut self, index: usize) {
        while self.capacity < index {
            let old_capacity = self.capacity;
            let new_capacity = old_capacity * 2;

            self.tree.resize(new_capacity + 1, 0.0_f64);
            // the old root already carries the full sum
            self.tree[new_capacity] = self.tree[old_capacity];

            self.capacity = new_capacity;
        }
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::ClosedOpenUnitF64;
    use argsim_core::cogs::{Rng, RngCore as _};

    use super::RateIndex;
    use crate::rng::SeededRng;

    #[test]
    fn total_matches_recomputed_sum() {
        let mut rng = SeededRng::from_seed(172);
        let mut index = RateIndex::new();
        let mut weights = vec![0.0_f64; 257];

        for _ in 0..2000 {
            let slot = 1 + rng.sample_index(256);

            if weights[slot] > 0.0_f64 && rng.sample_event(0.3) {
                index.add(slot, -weights[slot]);
                weights[slot] = 0.0_f64;
            } else {
                let delta = rng.sample_uniform() * 10.0_f64;
                index.add(slot, delta);
                weights[slot] += delta;
            }

            let expected: f64 = weights.iter().sum();
            assert!((index.total() - expected).abs() < 1.0e-9 * expected.max(1.0));
        }

        for (slot, weight) in weights.iter().enumerate().skip(1) {
            assert!((index.weight(slot) - weight).abs() < 1.0e-9);
        }
    }

    #[test]
    fn sampling_respects_the_boundary_contract() {
        let mut rng = SeededRng::from_seed(9981);
        let mut index = RateIndex::new();
        let mut weights = vec![0.0_f64; 100];

        for slot in (1..100).step_by(3) {
            let weight = rng.sample_uniform() * 5.0_f64;
            index.add(slot, weight);
            weights[slot] = weight;
        }

        for _ in 0..5000 {
            let fraction = ClosedOpenUnitF64::try_from(rng.sample_uniform()).unwrap();
            let (slot, residue) = index.find_cumulative_fraction(fraction);

            let cumulative_before: f64 = weights[..slot].iter().sum();
            let target = fraction.get() * index.total();

            assert!(cumulative_before <= target + 1.0e-9);
            assert!(target < cumulative_before + weights[slot] + 1.0e-9);
            assert!((residue - (target - cumulative_before)).abs() < 1.0e-9);
            assert!(weights[slot] > 0.0_f64, "zero-weight slots are never selected");
        }
    }

    #[test]
    fn capacity_doubles_without_losing_the_total() {
        let mut index = RateIndex::new();

        index.add(1, 2.5);
        assert_eq!(index.capacity(), 1);

        index.add(1000, 1.5);
        assert!(index.capacity() >= 1000);
        assert!((index.total() - 4.0).abs() < 1.0e-12);
        assert!((index.weight(1) - 2.5).abs() < 1.0e-12);
        assert!((index.weight(1000) - 1.5).abs() < 1.0e-12);
    }
}
