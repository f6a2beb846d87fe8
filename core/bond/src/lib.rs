#![deny(clippy::pedantic)]

mod closed_open_unit_f64;
mod closed_unit_f64;
mod non_negative_f64;
mod positive_f64;

pub use closed_open_unit_f64::ClosedOpenUnitF64;
pub use closed_unit_f64::ClosedUnitF64;
pub use non_negative_f64::NonNegativeF64;
pub use positive_f64::PositiveF64;
