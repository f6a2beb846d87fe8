use serde::{Deserialize, Serialize};

/// The set of present-day samples inheriting an ancestral interval, as a
/// fixed-width bitset over sample indices.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Leafset {
    blocks: Vec<u64>,
    count: u32,
}

impl core::fmt::Debug for Leafset {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_set().entries(self.iter()).finish()
    }
}

impl Leafset {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            count: 0,
        }
    }

    #[must_use]
    pub fn singleton(sample: u32) -> Self {
        let block = (sample / 64) as usize;

        let mut blocks = vec![0_u64; block + 1];
        blocks[block] = 1_u64 << (sample % 64);

        Self { blocks, count: 1 }
    }

    #[must_use]
    pub fn contains(&self, sample: u32) -> bool {
        let block = (sample / 64) as usize;

        self.blocks
            .get(block)
            .map_or(false, |b| b & (1_u64 << (sample % 64)) != 0)
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether every one of the run's `n_samples` samples inherits this
    /// interval, i.e. the interval has fully coalesced.
    #[must_use]
    pub fn covers_all(&self, n_samples: u32) -> bool {
        self.count == n_samples
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut union = self.clone();
        union.union_with(other);
        union
    }

    pub fn union_with(&mut self, other: &Self) {
        if self.blocks.len() < other.blocks.len() {
            self.blocks.resize(other.blocks.len(), 0_u64);
        }

        for (block, other_block) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *block |= *other_block;
        }

        self.count = self.blocks.iter().map(|b| b.count_ones()).sum();
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks.iter().enumerate().flat_map(|(i, block)| {
            #[allow(clippy::cast_possible_truncation)]
            (0..64_u32)
                .filter(move |bit| block & (1_u64 << bit) != 0)
                .map(move |bit| (i as u32) * 64 + bit)
        })
    }
}
