use argsim_core_bond::NonNegativeF64;

use argsim_core::population::PopId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Migration {
    pub from: PopId,
    pub to: PopId,
    pub rate: NonNegativeF64,
}

/// Per-ordered-pair backward-time migration rates. The total rate scales
/// each entry by the source pop's current roster size; picking an entry is
/// a cumulative scan in insertion order, so runs replay deterministically.
#[derive(Debug, Default)]
pub struct MigrationTable {
    entries: Vec<Migration>,
}

impl MigrationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[Migration] {
        &self.entries
    }

    /// Replaces the `from -> to` rate; a zero rate removes the entry.
    pub fn set_rate(&mut self, from: PopId, to: PopId, rate: NonNegativeF64) {
        debug_assert!(from != to);

        self.entries
            .retain(|entry| !(entry.from == from && entry.to == to));

        if rate > NonNegativeF64::zero() {
            self.entries.push(Migration { from, to, rate });
        }
    }

    /// Drops every entry touching `pop`, e.g. after it merges away in a
    /// population split.
    pub fn remove_involving(&mut self, pop: PopId) {
        self.entries
            .retain(|entry| entry.from != pop && entry.to != pop);
    }

    /// Total migration rate given the current per-pop roster sizes.
    #[must_use]
    pub fn total_rate(&self, roster_size: impl Fn(PopId) -> usize) -> NonNegativeF64 {
        let total = self
            .entries
            .iter()
            .map(|entry| {
                #[allow(clippy::cast_precision_loss)]
                let lineages = roster_size(entry.from) as f64;

                entry.rate.get() * lineages
            })
            .sum::<f64>();

        unsafe { NonNegativeF64::new_unchecked(total) }
    }

    /// Resolves a point in `[0, total_rate)` to its migration entry.
    #[must_use]
    pub fn pick(&self, target: f64, roster_size: impl Fn(PopId) -> usize) -> Option<Migration> {
        let mut remaining = target;

        for entry in &self.entries {
            #[allow(clippy::cast_precision_loss)]
            let weight = entry.rate.get() * (roster_size(entry.from) as f64);

            if remaining < weight {
                return Some(*entry);
            }

            remaining -= weight;
        }

        // rounding pushed the target past the last entry
        self.entries
            .iter()
            .rev()
            .find(|entry| roster_size(entry.from) > 0)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::NonNegativeF64;

    use argsim_core::population::PopId;

    use super::MigrationTable;

    #[test]
    fn rates_accumulate_over_source_lineages() {
        let mut table = MigrationTable::new();
        let (a, b, c) = (PopId::new(0), PopId::new(1), PopId::new(2));

        table.set_rate(a, b, NonNegativeF64::try_from(0.5).unwrap());
        table.set_rate(b, a, NonNegativeF64::try_from(0.25).unwrap());
        table.set_rate(c, a, NonNegativeF64::try_from(1.0).unwrap());

        let sizes = |pop: PopId| match pop.index() {
            0 => 4,
            1 => 2,
            _ => 0,
        };

        // 0.5*4 + 0.25*2 + 1.0*0
        assert!((table.total_rate(sizes).get() - 2.5).abs() < 1.0e-12);

        assert_eq!(table.pick(0.3, sizes).unwrap().to, b);
        assert_eq!(table.pick(2.1, sizes).unwrap().to, a);

        table.remove_involving(b);
        assert_eq!(table.entries().len(), 1);
        assert!((table.total_rate(sizes).get() - 0.0).abs() < 1.0e-12);
    }

    #[test]
    fn zero_rate_removes_the_entry() {
        let mut table = MigrationTable::new();
        let (a, b) = (PopId::new(0), PopId::new(1));

        table.set_rate(a, b, NonNegativeF64::try_from(0.5).unwrap());
        table.set_rate(a, b, NonNegativeF64::zero());

        assert!(table.entries().is_empty());
    }
}
