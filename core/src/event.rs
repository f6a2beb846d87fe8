use argsim_core_bond::NonNegativeF64;
use serde::{Deserialize, Serialize};

use crate::{ancestry::Seg, lineage::LineageId, population::PopId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Coalescence,
    Recombination,
    GeneConversion,
}

/// One consumed child branch of a structural event, with the intervals it
/// carried. The child lineage no longer exists when the event is observed,
/// so the branch is self-contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeChild {
    pub lineage: LineageId,
    pub birth_generation: NonNegativeF64,
    pub intervals: Vec<Seg>,
}

/// A structural edge of the growing ARG: which child branch(es) were
/// consumed at `generation` and which parent lineage(s) replaced them.
/// An empty parent list means the children's material fully coalesced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEvent {
    pub kind: EdgeKind,
    pub generation: NonNegativeF64,
    pub pop: PopId,
    pub children: Vec<EdgeChild>,
    pub parents: Vec<LineageId>,
}
