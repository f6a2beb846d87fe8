use core::{
    cmp::Ordering,
    convert::TryFrom,
    fmt,
    hash::{Hash, Hasher},
    ops::{Add, Mul},
};

use float_next_after::NextAfter;
use serde::{Deserialize, Serialize};

use crate::NonNegativeF64;

#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct PositiveF64Error(f64);

impl fmt::Display for PositiveF64Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} is not positive.", self.0)
    }
}

#[allow(clippy::unsafe_derive_deserialize)]
#[derive(Copy, Clone, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "f64")]
pub struct PositiveF64(f64);

impl TryFrom<f64> for PositiveF64 {
    type Error = PositiveF64Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Debug for PositiveF64 {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        struct PositiveF64Range(f64);

        impl fmt::Debug for PositiveF64Range {
            fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
                write!(fmt, "0.0 < {}", self.0)
            }
        }

        fmt.debug_tuple("PositiveF64")
            .field(&PositiveF64Range(self.0))
            .finish()
    }
}

impl PositiveF64 {
    /// # Errors
    ///
    /// Returns `PositiveF64Error` if not `0.0 < value`
    pub fn new(value: f64) -> Result<Self, PositiveF64Error> {
        if value > 0.0 {
            Ok(Self(value))
        } else {
            Err(PositiveF64Error(value))
        }
    }

    /// # Safety
    ///
    /// Only safe iff `0.0 < value`
    #[must_use]
    pub unsafe fn new_unchecked(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn infinity() -> Self {
        Self(f64::INFINITY)
    }

    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }

    /// The smallest positive value strictly after `before` that is at least
    /// `value`, used to keep event generations strictly increasing.
    #[must_use]
    pub fn max_after(before: NonNegativeF64, value: NonNegativeF64) -> Self {
        if value > before {
            Self(value.get())
        } else {
            Self(before.get().next_after(f64::INFINITY))
        }
    }
}

impl PartialEq for PositiveF64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl Eq for PositiveF64 {}

impl PartialOrd for PositiveF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PositiveF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for PositiveF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialEq<NonNegativeF64> for PositiveF64 {
    fn eq(&self, other: &NonNegativeF64) -> bool {
        self.0.eq(&other.get())
    }
}

impl PartialOrd<NonNegativeF64> for PositiveF64 {
    fn partial_cmp(&self, other: &NonNegativeF64) -> Option<Ordering> {
        self.0.partial_cmp(&other.get())
    }
}

impl PartialEq<f64> for PositiveF64 {
    fn eq(&self, other: &f64) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<f64> for PositiveF64 {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl Mul for PositiveF64 {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self(self.0 * other.0)
    }
}

impl Add<NonNegativeF64> for PositiveF64 {
    type Output = Self;

    fn add(self, other: NonNegativeF64) -> Self {
        Self(self.0 + other.get())
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use crate::NonNegativeF64;

    use super::PositiveF64;

    #[test]
    fn range_is_enforced_at_construction() {
        assert!(PositiveF64::try_from(1.0e-300_f64).is_ok());
        assert!(PositiveF64::try_from(0.0_f64).is_err());
        assert!(PositiveF64::try_from(-1.0_f64).is_err());
    }

    #[test]
    fn serde_round_trips_and_rejects_out_of_range() {
        let value = PositiveF64::try_from(0.5_f64).unwrap();

        let json = serde_json::to_string(&value).unwrap();
        let back: PositiveF64 = serde_json::from_str(&json).unwrap();
        assert!(back == value);

        assert!(serde_json::from_str::<PositiveF64>("0.0").is_err());
    }

    #[test]
    fn max_after_always_advances_strictly() {
        let before = NonNegativeF64::try_from(3.0_f64).unwrap();

        let ahead = PositiveF64::max_after(before, NonNegativeF64::try_from(5.0_f64).unwrap());
        assert!(ahead == 5.0_f64);

        // a value at or behind `before` is nudged one ulp past it
        let nudged = PositiveF64::max_after(before, NonNegativeF64::try_from(3.0_f64).unwrap());
        assert!(nudged > before);
        assert!(nudged.get() - 3.0_f64 < 1.0e-12);
    }
}
