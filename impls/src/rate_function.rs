use argsim_core_bond::{NonNegativeF64, PositiveF64};
use thiserror::Error;

#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum RateFunctionError {
    #[error("a product of two time-varying rate functions has no closed-form integral")]
    NonIntegrableProduct,
    #[error("piecewise rate breakpoints must strictly increase in generation")]
    UnorderedBreakpoints,
    #[error("a piecewise rate needs at least one breakpoint")]
    EmptyPiecewise,
}

/// Symbolic non-negative rate function of the backward-time generation,
/// restricted to shapes with a closed-form antiderivative. Compositions
/// that would lose that property are rejected at construction, never
/// silently approximated.
#[derive(Debug, Clone)]
pub enum RateFunction {
    Constant(NonNegativeF64),
    /// Step function; each `(generation, rate)` pair holds from its
    /// generation until the next breakpoint. The first rate also covers
    /// all earlier generations.
    Piecewise(Vec<(NonNegativeF64, NonNegativeF64)>),
    /// `coeff * exp(exponent * (t - origin))`
    Exponential {
        coeff: NonNegativeF64,
        exponent: f64,
        origin: NonNegativeF64,
    },
    /// `scale / (1 + shape * exp(steepness * (t - origin)))`
    Logistic {
        scale: PositiveF64,
        shape: PositiveF64,
        steepness: f64,
        origin: NonNegativeF64,
    },
    Sum(Box<RateFunction>, Box<RateFunction>),
    Scaled(NonNegativeF64, Box<RateFunction>),
}

impl RateFunction {
    #[must_use]
    pub fn constant(value: NonNegativeF64) -> Self {
        Self::Constant(value)
    }

    /// # Errors
    ///
    /// Returns `RateFunctionError` if the breakpoint list is empty or not
    /// strictly increasing in generation.
    pub fn piecewise(
        breakpoints: Vec<(NonNegativeF64, NonNegativeF64)>,
    ) -> Result<Self, RateFunctionError> {
        if breakpoints.is_empty() {
            return Err(RateFunctionError::EmptyPiecewise);
        }

        if breakpoints.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
            return Err(RateFunctionError::UnorderedBreakpoints);
        }

        Ok(Self::Piecewise(breakpoints))
    }

    #[must_use]
    pub fn exponential(coeff: NonNegativeF64, exponent: f64, origin: NonNegativeF64) -> Self {
        if exponent == 0.0_f64 {
            Self::Constant(coeff)
        } else {
            Self::Exponential {
                coeff,
                exponent,
                origin,
            }
        }
    }

    #[must_use]
    pub fn logistic(
        scale: PositiveF64,
        shape: PositiveF64,
        steepness: f64,
        origin: NonNegativeF64,
    ) -> Self {
        Self::Logistic {
            scale,
            shape,
            steepness,
            origin,
        }
    }

    #[must_use]
    pub fn sum(a: Self, b: Self) -> Self {
        Self::Sum(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn scaled(factor: NonNegativeF64, inner: Self) -> Self {
        Self::Scaled(factor, Box::new(inner))
    }

    /// # Errors
    ///
    /// Returns `RateFunctionError::NonIntegrableProduct` unless at least
    /// one factor is constant.
    pub fn product(a: Self, b: Self) -> Result<Self, RateFunctionError> {
        match (a, b) {
            (Self::Constant(factor), other) | (other, Self::Constant(factor)) => {
                Ok(Self::scaled(factor, other))
            }
            _ => Err(RateFunctionError::NonIntegrableProduct),
        }
    }

    #[must_use]
    pub fn rate_at(&self, t: f64) -> f64 {
        match self {
            Self::Constant(value) => value.get(),
            Self::Piecewise(breakpoints) => {
                let position = breakpoints.partition_point(|(gen, _)| gen.get() <= t);

                breakpoints[position.saturating_sub(1)].1.get()
            }
            Self::Exponential {
                coeff,
                exponent,
                origin,
            } => coeff.get() * (exponent * (t - origin.get())).exp(),
            Self::Logistic {
                scale,
                shape,
                steepness,
                origin,
            } => {
                scale.get()
                    / (1.0_f64 + shape.get() * (steepness * (t - origin.get())).exp())
            }
            Self::Sum(a, b) => a.rate_at(t) + b.rate_at(t),
            Self::Scaled(factor, inner) => factor.get() * inner.rate_at(t),
        }
    }

    /// Closed-form definite integral of the rate from `t0` to `t`.
    #[debug_requires(t >= t0, "integrates forward in backward time")]
    #[must_use]
    pub fn integral_from(&self, t0: f64, t: f64) -> f64 {
        match self {
            Self::Constant(value) => value.get() * (t - t0),
            Self::Piecewise(breakpoints) => {
                let mut integral = 0.0_f64;

                for (index, (gen, rate)) in breakpoints.iter().enumerate() {
                    let seg_beg = if index == 0 { f64::NEG_INFINITY } else { gen.get() };
                    let seg_end = breakpoints
                        .get(index + 1)
                        .map_or(f64::INFINITY, |(next, _)| next.get());

                    let lo = seg_beg.max(t0);
                    let hi = seg_end.min(t);

                    if hi > lo {
                        integral += rate.get() * (hi - lo);
                    }
                }

                integral
            }
            Self::Exponential {
                coeff,
                exponent,
                origin,
            } => {
                (coeff.get() / exponent)
                    * ((exponent * (t - origin.get())).exp()
                        - (exponent * (t0 - origin.get())).exp())
            }
            Self::Logistic {
                scale,
                shape,
                steepness,
                origin,
            } => {
                let log_term = |u: f64| {
                    ln_one_plus_exp(shape.get().ln() + steepness * (u - origin.get()))
                };

                scale.get() * ((t - t0) - (log_term(t) - log_term(t0)) / steepness)
            }
            Self::Sum(a, b) => a.integral_from(t0, t) + b.integral_from(t0, t),
            Self::Scaled(factor, inner) => factor.get() * inner.integral_from(t0, t),
        }
    }
}

// ln(1 + e^z) without overflowing for large z
fn ln_one_plus_exp(z: f64) -> f64 {
    if z > 0.0_f64 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::{NonNegativeF64, PositiveF64};

    use super::{RateFunction, RateFunctionError};

    fn nn(value: f64) -> NonNegativeF64 {
        NonNegativeF64::try_from(value).unwrap()
    }

    fn pos(value: f64) -> PositiveF64 {
        PositiveF64::try_from(value).unwrap()
    }

    fn numeric_integral(rate: &RateFunction, t0: f64, t: f64) -> f64 {
        const STEPS: usize = 200_000;

        let dt = (t - t0) / (STEPS as f64);

        (0..STEPS)
            .map(|i| rate.rate_at(t0 + ((i as f64) + 0.5) * dt) * dt)
            .sum()
    }

    #[test]
    fn closed_form_integrals_match_numeric_integration() {
        let functions = [
            RateFunction::constant(nn(0.37)),
            RateFunction::piecewise(vec![
                (nn(0.0), nn(1.0)),
                (nn(2.5), nn(0.25)),
                (nn(7.0), nn(3.0)),
            ])
            .unwrap(),
            RateFunction::exponential(nn(0.8), 0.31, nn(4.0)),
            RateFunction::exponential(nn(2.0), -0.12, nn(0.0)),
            RateFunction::logistic(pos(1.5), pos(0.4), 0.8, nn(3.0)),
            RateFunction::logistic(pos(0.9), pos(2.0), -0.5, nn(10.0)),
            RateFunction::sum(
                RateFunction::constant(nn(0.1)),
                RateFunction::exponential(nn(0.5), 0.2, nn(1.0)),
            ),
            RateFunction::scaled(nn(2.5), RateFunction::logistic(pos(1.0), pos(1.0), 0.3, nn(0.0))),
        ];

        for rate in &functions {
            for (t0, t) in [(0.0_f64, 1.0_f64), (0.5, 9.5), (3.0, 20.0)] {
                let exact = rate.integral_from(t0, t);
                let numeric = numeric_integral(rate, t0, t);

                assert!(
                    (exact - numeric).abs() < 1.0e-5 * numeric.abs().max(1.0),
                    "{rate:?}: integral over [{t0}, {t}] was {exact}, expected {numeric}"
                );
            }
        }
    }

    #[test]
    fn piecewise_lookup_uses_the_last_breakpoint_at_or_before() {
        let rate = RateFunction::piecewise(vec![(nn(0.0), nn(1.0)), (nn(5.0), nn(2.0))]).unwrap();

        assert!((rate.rate_at(0.0) - 1.0).abs() < f64::EPSILON);
        assert!((rate.rate_at(4.999) - 1.0).abs() < f64::EPSILON);
        assert!((rate.rate_at(5.0) - 2.0).abs() < f64::EPSILON);
        assert!((rate.rate_at(100.0) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_integrable_products_are_rejected_at_construction() {
        let varying_a = RateFunction::exponential(nn(1.0), 0.1, nn(0.0));
        let varying_b = RateFunction::logistic(pos(1.0), pos(1.0), 0.2, nn(0.0));

        assert!(matches!(
            RateFunction::product(varying_a.clone(), varying_b),
            Err(RateFunctionError::NonIntegrableProduct)
        ));

        let scaled = RateFunction::product(RateFunction::constant(nn(2.0)), varying_a).unwrap();
        assert!((scaled.rate_at(0.0) - 2.0).abs() < 1.0e-12);
    }

    #[test]
    fn malformed_piecewise_breakpoints_are_rejected() {
        assert!(matches!(
            RateFunction::piecewise(vec![]),
            Err(RateFunctionError::EmptyPiecewise)
        ));

        assert!(matches!(
            RateFunction::piecewise(vec![(nn(1.0), nn(0.5)), (nn(1.0), nn(0.7))]),
            Err(RateFunctionError::UnorderedBreakpoints)
        ));
    }
}
