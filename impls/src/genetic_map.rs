use argsim_core_bond::ClosedUnitF64;
use thiserror::Error;

use argsim_core::cogs::GeneticMap;

#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum GeneticMapError {
    #[error("a genetic map needs control points at both region ends")]
    MissingEndpoints,
    #[error("genetic map control points must strictly increase in both coordinates")]
    NonMonotone,
}

/// Uniform recombination: physical and genetic coordinates coincide.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformGeneticMap;

impl GeneticMap for UniformGeneticMap {
    fn physical_to_genetic(&self, pos: ClosedUnitF64) -> ClosedUnitF64 {
        pos
    }

    fn genetic_to_physical(&self, gpos: ClosedUnitF64) -> ClosedUnitF64 {
        gpos
    }
}

/// Piecewise-linear map between physical position and cumulative genetic
/// fraction, interpolated between validated control points.
#[derive(Debug, Clone)]
pub struct PiecewiseLinearGeneticMap {
    // (physical, genetic) control points covering [0, 1] in both axes
    points: Vec<(f64, f64)>,
}

impl PiecewiseLinearGeneticMap {
    /// # Errors
    ///
    /// Returns `GeneticMapError` unless the control points span the whole
    /// region and strictly increase in both coordinates.
    pub fn new(points: Vec<(ClosedUnitF64, ClosedUnitF64)>) -> Result<Self, GeneticMapError> {
        let points: Vec<(f64, f64)> = points
            .into_iter()
            .map(|(pos, gpos)| (pos.get(), gpos.get()))
            .collect();

        let spans_region = match (points.first(), points.last()) {
            (Some(&(first_pos, first_gpos)), Some(&(last_pos, last_gpos))) => {
                first_pos == 0.0_f64
                    && first_gpos == 0.0_f64
                    && last_pos == 1.0_f64
                    && last_gpos == 1.0_f64
            }
            _ => false,
        };

        if !spans_region || points.len() < 2 {
            return Err(GeneticMapError::MissingEndpoints);
        }

        if points
            .windows(2)
            .any(|pair| pair[0].0 >= pair[1].0 || pair[0].1 >= pair[1].1)
        {
            return Err(GeneticMapError::NonMonotone);
        }

        Ok(Self { points })
    }

    fn interpolate(points: impl Iterator<Item = (f64, f64)>, at: f64) -> f64 {
        let mut previous = (0.0_f64, 0.0_f64);

        for (x, y) in points {
            if at <= x {
                if x <= previous.0 {
                    return y;
                }

                let fraction = (at - previous.0) / (x - previous.0);

                return previous.1 + fraction * (y - previous.1);
            }

            previous = (x, y);
        }

        previous.1
    }
}

impl GeneticMap for PiecewiseLinearGeneticMap {
    fn physical_to_genetic(&self, pos: ClosedUnitF64) -> ClosedUnitF64 {
        let gpos = Self::interpolate(self.points.iter().copied(), pos.get());

        unsafe { ClosedUnitF64::new_unchecked(gpos.clamp(0.0_f64, 1.0_f64)) }
    }

    fn genetic_to_physical(&self, gpos: ClosedUnitF64) -> ClosedUnitF64 {
        let pos = Self::interpolate(self.points.iter().map(|&(x, y)| (y, x)), gpos.get());

        unsafe { ClosedUnitF64::new_unchecked(pos.clamp(0.0_f64, 1.0_f64)) }
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use super::*;

    fn loc(value: f64) -> ClosedUnitF64 {
        ClosedUnitF64::try_from(value).unwrap()
    }

    #[test]
    fn construction_validates_the_control_points() {
        assert!(PiecewiseLinearGeneticMap::new(vec![(loc(0.0), loc(0.0))]).is_err());

        assert!(PiecewiseLinearGeneticMap::new(vec![
            (loc(0.0), loc(0.0)),
            (loc(0.5), loc(0.7)),
            (loc(0.5), loc(0.8)),
            (loc(1.0), loc(1.0)),
        ])
        .is_err());

        assert!(PiecewiseLinearGeneticMap::new(vec![
            (loc(0.0), loc(0.0)),
            (loc(0.5), loc(0.7)),
            (loc(1.0), loc(1.0)),
        ])
        .is_ok());
    }

    #[test]
    fn interpolation_round_trips() {
        let map = PiecewiseLinearGeneticMap::new(vec![
            (loc(0.0), loc(0.0)),
            (loc(0.25), loc(0.6)),
            (loc(0.75), loc(0.8)),
            (loc(1.0), loc(1.0)),
        ])
        .unwrap();

        for pos in [0.0_f64, 0.1, 0.25, 0.4, 0.75, 0.9, 1.0] {
            let gpos = map.physical_to_genetic(loc(pos));
            let back = map.genetic_to_physical(gpos);

            assert!((back.get() - pos).abs() < 1.0e-12, "{pos} -> {back:?}");
        }

        // the hot first quarter holds 60% of the genetic length
        assert!((map.physical_to_genetic(loc(0.25)).get() - 0.6).abs() < 1.0e-12);
    }
}
