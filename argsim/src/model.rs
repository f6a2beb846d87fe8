use core::convert::TryFrom;

use thiserror::Error;

use argsim_core_bond::{ClosedUnitF64, NonNegativeF64, PositiveF64};

use argsim_core::population::PopId;
use argsim_impls::{
    genetic_map::{GeneticMapError, PiecewiseLinearGeneticMap},
    rate_function::RateFunctionError,
};

use crate::historical::HistoricalEvent;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("a model needs at least one pop")]
    NoPops,
    #[error("a model needs at least one sampled lineage")]
    NoSamples,
    #[error("pop {0:?} is declared twice")]
    DuplicatePop(String),
    #[error("pop {0:?} is not declared")]
    UnknownPop(String),
    #[error("pop {pop:?} has non-positive size {size}")]
    NonPositiveSize { pop: String, size: f64 },
    #[error("{what} must lie in [0, 1], got {value}")]
    InvalidFraction { what: &'static str, value: f64 },
    #[error("{what} must lie strictly inside (0, 1), got {value}")]
    FractionNotInterior { what: &'static str, value: f64 },
    #[error("{what} must be non-negative, got {value}")]
    NegativeRate { what: &'static str, value: f64 },
    #[error("{what} must be positive, got {value}")]
    NonPositiveRate { what: &'static str, value: f64 },
    #[error("{what} must be a non-negative generation, got {value}")]
    InvalidGeneration { what: &'static str, value: f64 },
    #[error("an exponential size change must end after it starts ({start_gen} >= {end_gen})")]
    EmptySizeChange { start_gen: f64, end_gen: f64 },
    #[error("migration from a pop to itself ({0:?})")]
    SelfMigration(String),
    #[error(transparent)]
    GeneticMap(#[from] GeneticMapError),
    #[error(transparent)]
    SweepTrajectory(#[from] RateFunctionError),
}

pub struct PopConfig {
    pub name: String,
    pub size: PositiveF64,
    pub samples: u32,
}

pub struct SweepConfig {
    pub pop: PopId,
    pub site: ClosedUnitF64,
    pub selection: PositiveF64,
    pub end_freq: ClosedUnitF64,
    pub end_gen: NonNegativeF64,
    pub trajectory: Option<Vec<(NonNegativeF64, ClosedUnitF64)>>,
}

/// A validated simulation model: pops with their present-day samples, the
/// migration matrix, the scheduled demographic changes, at most one
/// sweep, and the per-chromosome process rates. Validation happens once
/// in [`ModelBuilder::build`]; the engine never re-checks.
pub struct Model {
    pub(crate) pops: Vec<PopConfig>,
    pub(crate) migrations: Vec<(PopId, PopId, NonNegativeF64)>,
    pub(crate) events: Vec<(NonNegativeF64, HistoricalEvent)>,
    pub(crate) sweep: Option<SweepConfig>,
    pub(crate) recomb_rate: NonNegativeF64,
    pub(crate) gc_to_recomb_ratio: NonNegativeF64,
    pub(crate) gc_mean_tract: PositiveF64,
    pub(crate) mutation_rate: NonNegativeF64,
    pub(crate) genetic_map: Option<PiecewiseLinearGeneticMap>,
}

impl Model {
    #[must_use]
    pub fn n_samples(&self) -> u32 {
        self.pops.iter().map(|pop| pop.samples).sum()
    }

    /// Neutral mutation rate per chromosome per generation, for the
    /// driver to seed its mutation collaborator with.
    #[must_use]
    pub fn mutation_rate(&self) -> NonNegativeF64 {
        self.mutation_rate
    }

    /// The validated recombination map, when one was supplied; `None`
    /// means uniform recombination.
    #[must_use]
    pub fn genetic_map(&self) -> Option<&PiecewiseLinearGeneticMap> {
        self.genetic_map.as_ref()
    }
}

enum RawEvent {
    ChangeSize {
        gen: f64,
        pop: String,
        size: f64,
    },
    ExpChangeSize {
        gen: f64,
        end_gen: f64,
        pop: String,
        final_size: f64,
        exact: bool,
    },
    Bottleneck {
        gen: f64,
        pop: String,
        inbreeding: f64,
    },
    Split {
        gen: f64,
        from: String,
        to: String,
    },
    Admix {
        gen: f64,
        admixed: String,
        source: String,
        fraction: f64,
    },
    MigrationRateChange {
        gen: f64,
        from: String,
        to: String,
        rate: f64,
    },
}

struct RawSweep {
    pop: String,
    site: f64,
    selection: f64,
    end_freq: f64,
    end_gen: f64,
    trajectory: Option<Vec<(f64, f64)>>,
}

/// Collects a model declaratively, by pop name, and validates the whole
/// of it in [`ModelBuilder::build`].
#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ModelBuilder {
    pops: Vec<(String, f64, u32)>,
    migrations: Vec<(String, String, f64)>,
    events: Vec<RawEvent>,
    sweep: Option<RawSweep>,
    recomb_rate: f64,
    gc_to_recomb_ratio: f64,
    gc_mean_tract: f64,
    mutation_rate: f64,
    genetic_map: Option<Vec<(f64, f64)>>,
}

impl ModelBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gc_mean_tract: 0.01_f64,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pop(mut self, name: &str, size: f64, samples: u32) -> Self {
        self.pops.push((String::from(name), size, samples));
        self
    }

    /// Backward-time migration rate per source lineage per generation.
    #[must_use]
    pub fn migration(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.migrations
            .push((String::from(from), String::from(to), rate));
        self
    }

    #[must_use]
    pub fn change_size(mut self, gen: f64, pop: &str, size: f64) -> Self {
        self.events.push(RawEvent::ChangeSize {
            gen,
            pop: String::from(pop),
            size,
        });
        self
    }

    /// Exponential size change walked in fixed generation steps.
    #[must_use]
    pub fn exp_change_size(mut self, gen: f64, end_gen: f64, pop: &str, final_size: f64) -> Self {
        self.events.push(RawEvent::ExpChangeSize {
            gen,
            end_gen,
            pop: String::from(pop),
            final_size,
            exact: false,
        });
        self
    }

    /// Exponential size change driven by its closed-form coalescence
    /// process instead of stepped sizes.
    #[must_use]
    pub fn exp_change_size_exact(
        mut self,
        gen: f64,
        end_gen: f64,
        pop: &str,
        final_size: f64,
    ) -> Self {
        self.events.push(RawEvent::ExpChangeSize {
            gen,
            end_gen,
            pop: String::from(pop),
            final_size,
            exact: true,
        });
        self
    }

    #[must_use]
    pub fn bottleneck(mut self, gen: f64, pop: &str, inbreeding: f64) -> Self {
        self.events.push(RawEvent::Bottleneck {
            gen,
            pop: String::from(pop),
            inbreeding,
        });
        self
    }

    #[must_use]
    pub fn split(mut self, gen: f64, from: &str, to: &str) -> Self {
        self.events.push(RawEvent::Split {
            gen,
            from: String::from(from),
            to: String::from(to),
        });
        self
    }

    #[must_use]
    pub fn admix(mut self, gen: f64, admixed: &str, source: &str, fraction: f64) -> Self {
        self.events.push(RawEvent::Admix {
            gen,
            admixed: String::from(admixed),
            source: String::from(source),
            fraction,
        });
        self
    }

    #[must_use]
    pub fn migration_rate_change(mut self, gen: f64, from: &str, to: &str, rate: f64) -> Self {
        self.events.push(RawEvent::MigrationRateChange {
            gen,
            from: String::from(from),
            to: String::from(to),
            rate,
        });
        self
    }

    /// A single deterministic selective sweep ending (forward in time) at
    /// `end_gen` with the derived allele at `end_freq`.
    #[must_use]
    pub fn sweep(mut self, pop: &str, end_gen: f64, site: f64, selection: f64, end_freq: f64) -> Self {
        self.sweep = Some(RawSweep {
            pop: String::from(pop),
            site,
            selection,
            end_freq,
            end_gen,
            trajectory: None,
        });
        self
    }

    /// Replaces the sweep's deterministic trajectory with explicit
    /// `(generation, frequency)` steps; the first generation becomes the
    /// sweep's end, the last its start.
    #[must_use]
    pub fn sweep_trajectory(mut self, points: Vec<(f64, f64)>) -> Self {
        if let Some(sweep) = &mut self.sweep {
            sweep.trajectory = Some(points);
        }
        self
    }

    /// Recombination rate per chromosome per generation.
    #[must_use]
    pub fn recomb_rate(mut self, rate: f64) -> Self {
        self.recomb_rate = rate;
        self
    }

    /// Gene-conversion initiation rate as a multiple of the recombination
    /// rate, with the mean tract length as a fraction of the chromosome.
    #[must_use]
    pub fn gene_conversion(mut self, ratio: f64, mean_tract: f64) -> Self {
        self.gc_to_recomb_ratio = ratio;
        self.gc_mean_tract = mean_tract;
        self
    }

    /// Neutral mutation rate per chromosome per generation.
    #[must_use]
    pub fn mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    /// Piecewise-linear map from physical to genetic position, as
    /// `(physical, genetic)` anchor points over `[0, 1]`.
    #[must_use]
    pub fn genetic_map(mut self, points: Vec<(f64, f64)>) -> Self {
        self.genetic_map = Some(points);
        self
    }

    /// # Errors
    ///
    /// Returns the first [`ModelError`] the configuration violates.
    #[allow(clippy::too_many_lines)]
    pub fn build(self) -> Result<Model, ModelError> {
        if self.pops.is_empty() {
            return Err(ModelError::NoPops);
        }

        let mut pops = Vec::with_capacity(self.pops.len());

        for (name, size, samples) in self.pops {
            if pops.iter().any(|pop: &PopConfig| pop.name == name) {
                return Err(ModelError::DuplicatePop(name));
            }

            let size = PositiveF64::try_from(size)
                .map_err(|_| ModelError::NonPositiveSize { pop: name.clone(), size })?;

            pops.push(PopConfig { name, size, samples });
        }

        if pops.iter().map(|pop| pop.samples).sum::<u32>() == 0 {
            return Err(ModelError::NoSamples);
        }

        let resolve = |name: &str| -> Result<PopId, ModelError> {
            pops.iter()
                .position(|pop| pop.name == name)
                .map(|index| {
                    #[allow(clippy::cast_possible_truncation)]
                    PopId::new(index as u32)
                })
                .ok_or_else(|| ModelError::UnknownPop(String::from(name)))
        };

        let mut migrations = Vec::with_capacity(self.migrations.len());

        for (from, to, rate) in self.migrations {
            if from == to {
                return Err(ModelError::SelfMigration(from));
            }

            let rate = non_negative("migration rate", rate)?;

            migrations.push((resolve(&from)?, resolve(&to)?, rate));
        }

        let mut events = Vec::with_capacity(self.events.len());

        for raw in self.events {
            let (gen, event) = match raw {
                RawEvent::ChangeSize { gen, pop, size } => {
                    let size = PositiveF64::try_from(size)
                        .map_err(|_| ModelError::NonPositiveSize { pop: pop.clone(), size })?;

                    (gen, HistoricalEvent::ChangeSize { pop: resolve(&pop)?, size })
                }
                RawEvent::ExpChangeSize { gen, end_gen, pop, final_size, exact } => {
                    if end_gen <= gen {
                        return Err(ModelError::EmptySizeChange { start_gen: gen, end_gen });
                    }

                    let final_size = PositiveF64::try_from(final_size).map_err(|_| {
                        ModelError::NonPositiveSize { pop: pop.clone(), size: final_size }
                    })?;
                    let end_gen = generation("exponential size change end", end_gen)?;
                    let pop = resolve(&pop)?;

                    let event = if exact {
                        HistoricalEvent::ExpChangeSizeExact { pop, end_gen, final_size }
                    } else {
                        HistoricalEvent::ExpChangeSize { pop, end_gen, final_size, started: None }
                    };

                    (gen, event)
                }
                RawEvent::Bottleneck { gen, pop, inbreeding } => {
                    let inbreeding = interior_fraction("bottleneck inbreeding", inbreeding)?;

                    (gen, HistoricalEvent::Bottleneck { pop: resolve(&pop)?, inbreeding })
                }
                RawEvent::Split { gen, from, to } => {
                    if from == to {
                        return Err(ModelError::SelfMigration(from));
                    }

                    (gen, HistoricalEvent::Split { from: resolve(&from)?, to: resolve(&to)? })
                }
                RawEvent::Admix { gen, admixed, source, fraction } => {
                    let fraction = ClosedUnitF64::try_from(fraction).map_err(|_| {
                        ModelError::InvalidFraction { what: "admixture fraction", value: fraction }
                    })?;

                    (
                        gen,
                        HistoricalEvent::Admix {
                            admixed: resolve(&admixed)?,
                            source: resolve(&source)?,
                            fraction,
                        },
                    )
                }
                RawEvent::MigrationRateChange { gen, from, to, rate } => {
                    if from == to {
                        return Err(ModelError::SelfMigration(from));
                    }

                    let rate = non_negative("migration rate", rate)?;

                    (
                        gen,
                        HistoricalEvent::MigrationRateChange {
                            from: resolve(&from)?,
                            to: resolve(&to)?,
                            rate,
                        },
                    )
                }
            };

            events.push((generation("event generation", gen)?, event));
        }

        let sweep = match self.sweep {
            Some(raw) => {
                let site = ClosedUnitF64::try_from(raw.site).map_err(|_| {
                    ModelError::InvalidFraction { what: "sweep site", value: raw.site }
                })?;
                let selection = PositiveF64::try_from(raw.selection).map_err(|_| {
                    ModelError::NonPositiveRate {
                        what: "selection coefficient",
                        value: raw.selection,
                    }
                })?;
                let end_freq = interior_fraction("sweep end frequency", raw.end_freq)?;

                let trajectory = match raw.trajectory {
                    Some(points) => {
                        let mut validated = Vec::with_capacity(points.len());

                        for (gen, freq) in points {
                            validated.push((
                                generation("sweep trajectory generation", gen)?,
                                interior_fraction("sweep trajectory frequency", freq)?,
                            ));
                        }

                        if validated.is_empty() {
                            return Err(RateFunctionError::EmptyPiecewise.into());
                        }

                        if validated.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
                            return Err(RateFunctionError::UnorderedBreakpoints.into());
                        }

                        Some(validated)
                    }
                    None => None,
                };

                Some(SweepConfig {
                    pop: resolve(&raw.pop)?,
                    site,
                    selection,
                    end_freq,
                    end_gen: generation("sweep end generation", raw.end_gen)?,
                    trajectory,
                })
            }
            None => None,
        };

        let genetic_map = match self.genetic_map {
            Some(points) => {
                let mut validated = Vec::with_capacity(points.len());

                for (physical, genetic) in points {
                    let physical = ClosedUnitF64::try_from(physical).map_err(|_| {
                        ModelError::InvalidFraction { what: "map physical position", value: physical }
                    })?;
                    let genetic = ClosedUnitF64::try_from(genetic).map_err(|_| {
                        ModelError::InvalidFraction { what: "map genetic position", value: genetic }
                    })?;

                    validated.push((physical, genetic));
                }

                Some(PiecewiseLinearGeneticMap::new(validated)?)
            }
            None => None,
        };

        Ok(Model {
            pops,
            migrations,
            events,
            sweep,
            recomb_rate: non_negative("recombination rate", self.recomb_rate)?,
            gc_to_recomb_ratio: non_negative("gene-conversion ratio", self.gc_to_recomb_ratio)?,
            gc_mean_tract: PositiveF64::try_from(self.gc_mean_tract).map_err(|_| {
                ModelError::NonPositiveRate {
                    what: "gene-conversion mean tract",
                    value: self.gc_mean_tract,
                }
            })?,
            mutation_rate: non_negative("mutation rate", self.mutation_rate)?,
            genetic_map,
        })
    }
}

fn non_negative(what: &'static str, value: f64) -> Result<NonNegativeF64, ModelError> {
    NonNegativeF64::try_from(value).map_err(|_| ModelError::NegativeRate { what, value })
}

fn generation(what: &'static str, value: f64) -> Result<NonNegativeF64, ModelError> {
    NonNegativeF64::try_from(value).map_err(|_| ModelError::InvalidGeneration { what, value })
}

fn interior_fraction(what: &'static str, value: f64) -> Result<ClosedUnitF64, ModelError> {
    if value > 0.0_f64 && value < 1.0_f64 {
        Ok(unsafe { ClosedUnitF64::new_unchecked(value) })
    } else {
        Err(ModelError::FractionNotInterior { what, value })
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelBuilder, ModelError};

    fn base() -> ModelBuilder {
        ModelBuilder::new().pop("european", 10_000.0, 10)
    }

    #[test]
    fn a_minimal_model_builds() {
        let model = base().build().unwrap();

        assert_eq!(model.n_samples(), 10);
    }

    #[test]
    fn empty_models_are_rejected() {
        assert!(matches!(ModelBuilder::new().build(), Err(ModelError::NoPops)));
        assert!(matches!(
            ModelBuilder::new().pop("european", 10_000.0, 0).build(),
            Err(ModelError::NoSamples)
        ));
    }

    #[test]
    fn references_to_undeclared_pops_are_rejected() {
        let result = base().migration("european", "african", 1.0e-4).build();

        assert!(matches!(result, Err(ModelError::UnknownPop(name)) if name == "african"));
    }

    #[test]
    fn duplicate_pops_are_rejected() {
        let result = base().pop("european", 5_000.0, 1).build();

        assert!(matches!(result, Err(ModelError::DuplicatePop(_))));
    }

    #[test]
    fn non_positive_sizes_are_rejected() {
        let result = ModelBuilder::new().pop("european", 0.0, 2).build();

        assert!(matches!(result, Err(ModelError::NonPositiveSize { .. })));

        let result = base().change_size(50.0, "european", -3.0).build();

        assert!(matches!(result, Err(ModelError::NonPositiveSize { .. })));
    }

    #[test]
    fn exponential_changes_must_span_generations() {
        let result = base()
            .exp_change_size(100.0, 100.0, "european", 500.0)
            .build();

        assert!(matches!(result, Err(ModelError::EmptySizeChange { .. })));
    }

    #[test]
    fn bottleneck_inbreeding_must_be_interior() {
        let result = base().bottleneck(40.0, "european", 1.0).build();

        assert!(matches!(result, Err(ModelError::FractionNotInterior { .. })));
    }

    #[test]
    fn sweep_parameters_are_checked() {
        let result = base().sweep("european", 10.0, 0.5, 0.0, 0.9).build();
        assert!(matches!(result, Err(ModelError::NonPositiveRate { .. })));

        let result = base().sweep("european", 10.0, 0.5, 0.02, 1.0).build();
        assert!(matches!(result, Err(ModelError::FractionNotInterior { .. })));
    }

    #[test]
    fn genetic_maps_must_span_the_chromosome() {
        let result = base()
            .genetic_map(vec![(0.0, 0.0), (0.5, 0.9)])
            .build();

        assert!(matches!(result, Err(ModelError::GeneticMap(_))));
    }

    #[test]
    fn the_built_model_exposes_the_map_and_mutation_rate() {
        use core::convert::TryFrom;

        use argsim_core::cogs::GeneticMap as _;
        use argsim_core_bond::ClosedUnitF64;

        let model = base()
            .mutation_rate(1.5)
            .genetic_map(vec![(0.0, 0.0), (0.25, 0.6), (1.0, 1.0)])
            .build()
            .unwrap();

        assert!(model.mutation_rate() == 1.5);

        let map = model.genetic_map().unwrap();
        let hot = map.physical_to_genetic(ClosedUnitF64::try_from(0.25).unwrap());

        assert!((hot.get() - 0.6).abs() < 1.0e-12);
    }
}
