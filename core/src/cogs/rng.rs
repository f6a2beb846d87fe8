/// The single source of randomness behind a simulation run. All draws the
/// engine makes funnel through `sample_uniform` so a recorded seed
/// reproduces a run bit for bit.
#[allow(clippy::inline_fn_without_body)]
#[contract_trait]
pub trait RngCore {
    #[debug_ensures(ret >= 0.0_f64 && ret < 1.0_f64, "samples U[0.0, 1.0)")]
    fn sample_uniform(&mut self) -> f64;
}

pub trait Rng: RngCore {
    #[must_use]
    fn sample_index(&mut self, length: usize) -> usize {
        debug_assert!(length > 0, "samples U(0, length - 1)");

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let index = (self.sample_uniform() * (length as f64)).floor() as usize;

        index.min(length - 1)
    }

    #[must_use]
    fn sample_exponential(&mut self, lambda: f64) -> f64 {
        debug_assert!(lambda > 0.0_f64, "lambda > 0.0");

        -(1.0_f64 - self.sample_uniform()).ln() / lambda
    }

    #[must_use]
    fn sample_event(&mut self, probability: f64) -> bool {
        debug_assert!(
            (0.0_f64..=1.0_f64).contains(&probability),
            "0.0 <= probability <= 1.0"
        );

        self.sample_uniform() < probability
    }

    #[must_use]
    fn sample_binomial(&mut self, n: usize, probability: f64) -> usize {
        debug_assert!(
            (0.0_f64..=1.0_f64).contains(&probability),
            "0.0 <= probability <= 1.0"
        );

        (0..n).filter(|_| self.sample_event(probability)).count()
    }

    #[must_use]
    fn sample_poisson(&mut self, lambda: f64) -> usize {
        debug_assert!(lambda >= 0.0_f64, "lambda >= 0.0");

        // Knuth's product-of-uniforms method, adequate for the small
        // per-edge means this simulator produces
        let threshold = (-lambda).exp();

        let mut count = 0_usize;
        let mut product = self.sample_uniform();

        while product > threshold {
            count += 1;
            product *= self.sample_uniform();
        }

        count
    }
}

impl<R: RngCore> Rng for R {}
