use argsim_core::cogs::Rng;
use thiserror::Error;

use crate::rate_function::RateFunction;

/// Time tolerance of the arrival-time inversion.
pub const ARRIVAL_EPS: f64 = 1.0e-9;
/// Step budget of the arrival-time inversion.
pub const ARRIVAL_MAX_STEPS: usize = 200;

/// An imprecise arrival time would silently bias coalescence-time
/// distributions, so exhausting the inversion budget is a hard error.
#[derive(Debug, Error)]
#[error("arrival-time inversion did not reach precision {eps} within {max_steps} steps")]
pub struct NonConvergence {
    pub eps: f64,
    pub max_steps: usize,
}

/// Non-homogeneous Poisson process over a symbolically integrable rate
/// function, sampled exactly by inverting the integrated rate (Cinlar's
/// method) instead of stepping time in fixed increments.
#[derive(Debug, Clone)]
pub struct ArrivalProcess {
    rate: RateFunction,
}

impl ArrivalProcess {
    #[must_use]
    pub fn new(rate: RateFunction) -> Self {
        Self { rate }
    }

    #[must_use]
    pub fn rate(&self) -> &RateFunction {
        &self.rate
    }

    /// Samples the time of the first arrival strictly after `from_time`
    /// under the instantaneous rate `rate(t) * rate_factor`. Returns
    /// `max_time` when no arrival falls before it.
    ///
    /// # Errors
    ///
    /// Returns `NonConvergence` if the root-finding step budget is
    /// exhausted before reaching `eps` time precision.
    #[debug_requires(rate_factor > 0.0_f64, "the factor scales a live process")]
    #[debug_requires(max_time >= from_time)]
    #[debug_ensures(ret.as_ref().map_or(true, |t| *t >= from_time && *t <= max_time))]
    pub fn next_arrival_time<R: Rng>(
        &self,
        from_time: f64,
        max_time: f64,
        rate_factor: f64,
        rng: &mut R,
        eps: f64,
        max_steps: usize,
    ) -> Result<f64, NonConvergence> {
        let target = rng.sample_exponential(1.0_f64) / rate_factor;

        let bracket_end = if max_time.is_finite() {
            max_time
        } else {
            match self.bracket(from_time, target) {
                Some(end) => end,
                // the integral plateaus below the target: no arrival, ever
                None => return Ok(f64::INFINITY),
            }
        };

        if self.rate.integral_from(from_time, bracket_end) < target {
            return Ok(max_time.min(bracket_end));
        }

        let mut lo = from_time;
        let mut hi = bracket_end;

        for _ in 0..max_steps {
            let mid = 0.5_f64 * (lo + hi);

            if hi - lo <= eps {
                return Ok(mid);
            }

            if self.rate.integral_from(from_time, mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Err(NonConvergence { eps, max_steps })
    }

    // doubles an upper bound until the integral reaches the target
    fn bracket(&self, from_time: f64, target: f64) -> Option<f64> {
        let mut span = 1.0_f64;

        for _ in 0..1024 {
            if self.rate.integral_from(from_time, from_time + span) >= target {
                return Some(from_time + span);
            }

            span *= 2.0_f64;

            if !(from_time + span).is_finite() {
                break;
            }
        }

        None
    }
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::NonNegativeF64;

    use super::{ArrivalProcess, ARRIVAL_EPS, ARRIVAL_MAX_STEPS};
    use crate::{rate_function::RateFunction, rng::SeededRng};

    fn nn(value: f64) -> NonNegativeF64 {
        NonNegativeF64::try_from(value).unwrap()
    }

    #[test]
    fn constant_rate_arrivals_are_exponential() {
        let process = ArrivalProcess::new(RateFunction::constant(nn(2.0)));
        let mut rng = SeededRng::from_seed(31);

        let draws = 20_000_usize;
        let mut sum = 0.0_f64;
        let mut sum_sq = 0.0_f64;

        for _ in 0..draws {
            let wait = process
                .next_arrival_time(5.0, f64::INFINITY, 1.0, &mut rng, ARRIVAL_EPS, ARRIVAL_MAX_STEPS)
                .unwrap()
                - 5.0;

            sum += wait;
            sum_sq += wait * wait;
        }

        let mean = sum / (draws as f64);
        let var = sum_sq / (draws as f64) - mean * mean;

        // Exp(2): mean 0.5, variance 0.25
        assert!((mean - 0.5).abs() < 0.015, "mean {mean}");
        assert!((var - 0.25).abs() < 0.03, "variance {var}");
    }

    #[test]
    fn rate_factor_scales_waiting_times() {
        let process = ArrivalProcess::new(RateFunction::constant(nn(1.0)));
        let mut rng = SeededRng::from_seed(32);

        let draws = 20_000_usize;
        let mut sum = 0.0_f64;

        for _ in 0..draws {
            sum += process
                .next_arrival_time(0.0, f64::INFINITY, 4.0, &mut rng, ARRIVAL_EPS, ARRIVAL_MAX_STEPS)
                .unwrap();
        }

        // Exp(4): mean 0.25
        let mean = sum / (draws as f64);
        assert!((mean - 0.25).abs() < 0.01, "mean {mean}");
    }

    #[test]
    fn piecewise_segments_see_their_expected_event_counts() {
        // rate 2 on [0, 5), rate 0.5 on [5, 10)
        let process = ArrivalProcess::new(
            RateFunction::piecewise(vec![(nn(0.0), nn(2.0)), (nn(5.0), nn(0.5))]).unwrap(),
        );
        let mut rng = SeededRng::from_seed(33);

        let replicates = 2_000_usize;
        let mut early = 0_usize;
        let mut late = 0_usize;

        for _ in 0..replicates {
            let mut now = 0.0_f64;

            loop {
                now = process
                    .next_arrival_time(now, 10.0, 1.0, &mut rng, ARRIVAL_EPS, ARRIVAL_MAX_STEPS)
                    .unwrap();

                if now >= 10.0 {
                    break;
                }

                if now < 5.0 {
                    early += 1;
                } else {
                    late += 1;
                }
            }
        }

        // Poisson means per replicate: 10 events early, 2.5 late
        let early_mean = (early as f64) / (replicates as f64);
        let late_mean = (late as f64) / (replicates as f64);

        assert!((early_mean - 10.0).abs() < 0.25, "early {early_mean}");
        assert!((late_mean - 2.5).abs() < 0.15, "late {late_mean}");
    }

    #[test]
    fn capped_sampling_returns_the_cap_when_no_arrival_precedes_it() {
        let process = ArrivalProcess::new(RateFunction::constant(nn(1.0e-12)));
        let mut rng = SeededRng::from_seed(34);

        let arrival = process
            .next_arrival_time(3.0, 7.0, 1.0, &mut rng, ARRIVAL_EPS, ARRIVAL_MAX_STEPS)
            .unwrap();

        assert!((arrival - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exhausting_the_step_budget_fails_loudly() {
        let process = ArrivalProcess::new(RateFunction::constant(nn(1.0)));
        let mut rng = SeededRng::from_seed(35);

        let result = process.next_arrival_time(0.0, 1.0e6, 1.0, &mut rng, 0.0, 5);

        assert!(result.is_err());
    }
}
