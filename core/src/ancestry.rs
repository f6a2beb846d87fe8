use argsim_core_bond::{ClosedUnitF64, NonNegativeF64};
use serde::{Deserialize, Serialize};

use crate::{cogs::GeneticMap, leafset::Leafset};

/// One live ancestral segment: the half-open physical interval
/// `[beg, end)` and the present-day samples inheriting it.
///
/// Invariant: `beg < end` and the leafset is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seg {
    pub beg: ClosedUnitF64,
    pub end: ClosedUnitF64,
    pub leafset: Leafset,
}

/// The ancestral material carried by one lineage: an ordered list of
/// disjoint live segments. A record is never empty; operations that would
/// empty it return `None` instead, which is how a lineage terminates.
///
/// A segment whose leafset covers every sample in the run has fully
/// coalesced and is dropped by `union`, so live material across all active
/// lineages never double-counts finished ancestry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestryRecord {
    segs: Vec<Seg>,
}

impl AncestryRecord {
    /// The full-region record of one present-day sample.
    #[must_use]
    pub fn sample_leaf(sample: u32) -> Self {
        Self {
            segs: vec![Seg {
                beg: ClosedUnitF64::zero(),
                end: ClosedUnitF64::one(),
                leafset: Leafset::singleton(sample),
            }],
        }
    }

    #[must_use]
    pub fn segs(&self) -> &[Seg] {
        &self.segs
    }

    /// The physical span from the first to the last live position.
    #[must_use]
    pub fn hull(&self) -> (ClosedUnitF64, ClosedUnitF64) {
        // records are non-empty by construction
        (self.segs[0].beg, self.segs[self.segs.len() - 1].end)
    }

    #[must_use]
    pub fn contains(&self, loc: ClosedUnitF64) -> bool {
        self.leafset_at(loc).is_some()
    }

    #[must_use]
    pub fn leafset_at(&self, loc: ClosedUnitF64) -> Option<&Leafset> {
        for seg in &self.segs {
            if loc < seg.beg {
                break;
            }

            if loc < seg.end {
                return Some(&seg.leafset);
            }
        }

        None
    }

    /// Sum of the genetic lengths of all live segments.
    #[must_use]
    pub fn live_genetic_length<G: GeneticMap>(&self, map: &G) -> NonNegativeF64 {
        let length = self
            .segs
            .iter()
            .map(|seg| map.physical_to_genetic(seg.end).get() - map.physical_to_genetic(seg.beg).get())
            .sum::<f64>();

        unsafe { NonNegativeF64::new_unchecked(length.max(0.0_f64)) }
    }

    /// Genetic length of the hull, i.e. the span over which a
    /// recombination still separates ancestral material.
    #[must_use]
    pub fn hull_genetic_span<G: GeneticMap>(&self, map: &G) -> NonNegativeF64 {
        let (beg, end) = self.hull();

        let span = map.physical_to_genetic(end).get() - map.physical_to_genetic(beg).get();

        unsafe { NonNegativeF64::new_unchecked(span.max(0.0_f64)) }
    }

    /// Maps a genetic offset in `[0, live_genetic_length)` to the physical
    /// position that far into the live material.
    #[must_use]
    pub fn locate_genetic_offset<G: GeneticMap>(&self, offset: f64, map: &G) -> ClosedUnitF64 {
        debug_assert!(offset >= 0.0_f64);

        let mut remaining = offset;

        for seg in &self.segs {
            let gbeg = map.physical_to_genetic(seg.beg).get();
            let glen = map.physical_to_genetic(seg.end).get() - gbeg;

            if remaining < glen {
                let gpos = unsafe { ClosedUnitF64::new_unchecked((gbeg + remaining).min(1.0_f64)) };

                return map.genetic_to_physical(gpos);
            }

            remaining -= glen;
        }

        // rounding pushed the offset past the last segment
        self.segs[self.segs.len() - 1].end
    }

    /// Merges two child records into their common ancestor. Wherever both
    /// children carry material the leafsets join; joined segments covering
    /// all `n_samples` samples have fully coalesced and are dropped.
    /// Returns `None` when every segment coalesced away.
    #[must_use]
    pub fn union(a: &Self, b: &Self, n_samples: u32) -> Option<Self> {
        let mut cuts: Vec<f64> = a
            .segs
            .iter()
            .chain(b.segs.iter())
            .flat_map(|seg| [seg.beg.get(), seg.end.get()])
            .collect();
        cuts.sort_by(f64::total_cmp);
        cuts.dedup();

        let mut segs: Vec<Seg> = Vec::new();

        for window in cuts.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            let mid = unsafe { ClosedUnitF64::new_unchecked((lo + hi) * 0.5_f64) };

            let leafset = match (a.leafset_at(mid), b.leafset_at(mid)) {
                (None, None) => continue,
                (Some(leaves), None) | (None, Some(leaves)) => leaves.clone(),
                (Some(ours), Some(theirs)) => ours.union(theirs),
            };

            if leafset.covers_all(n_samples) {
                continue;
            }

            Self::push_merged(&mut segs, lo, hi, leafset);
        }

        if segs.is_empty() {
            None
        } else {
            Some(Self { segs })
        }
    }

    /// Splits the record at `loc` into its left and right parent material.
    /// Returns `None` when `loc` lies outside the hull, in which case a
    /// recombination there separates nothing.
    #[must_use]
    pub fn split_at(&self, loc: ClosedUnitF64) -> Option<(Self, Self)> {
        let (hull_beg, hull_end) = self.hull();

        if loc <= hull_beg || loc >= hull_end {
            return None;
        }

        let mut left: Vec<Seg> = Vec::new();
        let mut right: Vec<Seg> = Vec::new();

        for seg in &self.segs {
            if seg.end <= loc {
                left.push(seg.clone());
            } else if seg.beg >= loc {
                right.push(seg.clone());
            } else {
                left.push(Seg {
                    beg: seg.beg,
                    end: loc,
                    leafset: seg.leafset.clone(),
                });
                right.push(Seg {
                    beg: loc,
                    end: seg.end,
                    leafset: seg.leafset.clone(),
                });
            }
        }

        debug_assert!(!left.is_empty() && !right.is_empty());

        Some((Self { segs: left }, Self { segs: right }))
    }

    /// Splits the record into the material inside the conversion tract
    /// `[beg, end)` and its complement. Returns `None` unless both halves
    /// retain material, in which case the conversion changes nothing.
    #[must_use]
    pub fn extract_tract(&self, beg: ClosedUnitF64, end: ClosedUnitF64) -> Option<(Self, Self)> {
        debug_assert!(beg < end);

        let mut inside: Vec<Seg> = Vec::new();
        let mut outside: Vec<Seg> = Vec::new();

        for seg in &self.segs {
            let clip_beg = seg.beg.max(beg);
            let clip_end = seg.end.min(end);

            if clip_beg < clip_end {
                inside.push(Seg {
                    beg: clip_beg,
                    end: clip_end,
                    leafset: seg.leafset.clone(),
                });
            }

            if seg.beg < beg {
                let left_end = seg.end.min(beg);

                if seg.beg < left_end {
                    outside.push(Seg {
                        beg: seg.beg,
                        end: left_end,
                        leafset: seg.leafset.clone(),
                    });
                }
            }

            if seg.end > end {
                let right_beg = seg.beg.max(end);

                if right_beg < seg.end {
                    outside.push(Seg {
                        beg: right_beg,
                        end: seg.end,
                        leafset: seg.leafset.clone(),
                    });
                }
            }
        }

        if inside.is_empty() || outside.is_empty() {
            None
        } else {
            Some((Self { segs: inside }, Self { segs: outside }))
        }
    }

    fn push_merged(segs: &mut Vec<Seg>, lo: f64, hi: f64, leafset: Leafset) {
        if let Some(last) = segs.last_mut() {
            if last.end.get() == lo && last.leafset == leafset {
                last.end = unsafe { ClosedUnitF64::new_unchecked(hi) };
                return;
            }
        }

        segs.push(Seg {
            beg: unsafe { ClosedUnitF64::new_unchecked(lo) },
            end: unsafe { ClosedUnitF64::new_unchecked(hi) },
            leafset,
        });
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::ClosedUnitF64;

    use super::AncestryRecord;
    use crate::leafset::Leafset;

    fn loc(value: f64) -> ClosedUnitF64 {
        ClosedUnitF64::try_from(value).unwrap()
    }

    #[test]
    fn split_then_union_round_trips() {
        let record = AncestryRecord::sample_leaf(3);

        for cut in [0.1_f64, 0.25_f64, 0.5_f64, 0.733_f64, 0.99_f64] {
            let (left, right) = record.split_at(loc(cut)).unwrap();

            assert!(left.hull().1 == loc(cut));
            assert!(right.hull().0 == loc(cut));

            // 8 samples in the run, so nothing coalesces away
            let joined = AncestryRecord::union(&left, &right, 8).unwrap();

            assert_eq!(joined, record);
        }
    }

    #[test]
    fn split_outside_hull_is_rejected() {
        let record = AncestryRecord::sample_leaf(0);
        let (_, right) = record.split_at(loc(0.5)).unwrap();

        assert!(right.split_at(loc(0.25)).is_none());
        assert!(right.split_at(loc(0.5)).is_none());
        assert!(right.split_at(loc(0.75)).is_some());
    }

    #[test]
    fn union_drops_fully_coalesced_segments() {
        let a = AncestryRecord::sample_leaf(0);
        let b = AncestryRecord::sample_leaf(1);

        // two samples in the run: their union covers everything
        assert!(AncestryRecord::union(&a, &b, 2).is_none());

        // three samples: the union survives with a joint leafset
        let joined = AncestryRecord::union(&a, &b, 3).unwrap();

        assert_eq!(joined.segs().len(), 1);
        assert_eq!(joined.segs()[0].leafset.count(), 2);
    }

    #[test]
    fn partial_overlap_coalesces_only_the_overlap() {
        let (left_a, right_a) = AncestryRecord::sample_leaf(0).split_at(loc(0.4)).unwrap();
        let (_, right_b) = AncestryRecord::sample_leaf(1).split_at(loc(0.6)).unwrap();

        // child a: [0, 0.4), child b: [0.6, 1); no overlap, plain merge
        let joined = AncestryRecord::union(&left_a, &right_b, 2).unwrap();
        assert_eq!(joined.segs().len(), 2);

        // child a: [0.4, 1), child b: [0.6, 1); the overlap [0.6, 1)
        // covers both samples and dies, [0.4, 0.6) survives
        let joined = AncestryRecord::union(&right_a, &right_b, 2).unwrap();
        assert_eq!(joined.segs().len(), 1);
        assert!(joined.segs()[0].beg == loc(0.4));
        assert!(joined.segs()[0].end == loc(0.6));
    }

    #[test]
    fn tract_extraction_requires_both_halves() {
        let record = AncestryRecord::sample_leaf(0);

        let (inside, outside) = record.extract_tract(loc(0.3), loc(0.5)).unwrap();

        assert!(inside.hull() == (loc(0.3), loc(0.5)));
        assert_eq!(outside.segs().len(), 2);

        // a tract covering the whole record leaves no complement
        assert!(record.extract_tract(loc(0.0), loc(1.0)).is_none());

        // a tract outside the material converts nothing
        let (_, right) = record.split_at(loc(0.5)).unwrap();
        assert!(right.extract_tract(loc(0.1), loc(0.4)).is_none());
    }

    #[test]
    fn leafset_queries() {
        let set = Leafset::singleton(5).union(&Leafset::singleton(130));

        assert_eq!(set.count(), 2);
        assert!(set.contains(5));
        assert!(set.contains(130));
        assert!(!set.contains(6));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![5, 130]);
        assert!(!set.covers_all(3));
    }
}
