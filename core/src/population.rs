use core::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a population. Populations are never physically
/// deleted, only deactivated, so an id recorded in an event stream stays
/// resolvable for the whole run.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PopId(u32);

impl fmt::Debug for PopId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "PopId({})", self.0)
    }
}

impl PopId {
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
