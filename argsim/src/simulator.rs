use log::{debug, info, trace};
use thiserror::Error;

use argsim_core_bond::{ClosedOpenUnitF64, ClosedUnitF64, NonNegativeF64};

use argsim_core::{
    cogs::{GeneticMap, MutationPlacer, Rng},
    population::PopId,
    reporter::EdgeReporter,
};
use argsim_impls::{
    arrival::{NonConvergence, ARRIVAL_EPS, ARRIVAL_MAX_STEPS},
    rate_function::RateFunctionError,
};

use crate::{
    demography::Demography,
    historical::{EventOutcome, HistoricalEventQueue},
    model::Model,
    sweep::{SweepController, SweepPhase},
};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("an arrival-time inversion failed: {0}")]
    NonConvergence(#[from] NonConvergence),
    #[error("the sweep trajectory is not a valid step function: {0}")]
    SweepTrajectory(#[from] RateFunctionError),
}

/// Which competing event channel produced the earliest candidate time.
enum Channel {
    /// A scheduled model change or sweep phase transition, or no event at
    /// all when the candidate time is infinite.
    Boundary,
    /// The joint constant-rate channel: recombination, migration,
    /// homogeneous coalescence, and gene conversion.
    Homogeneous,
    /// An installed time-varying coalescence process.
    PopCoal(PopId),
    /// Cross-class recombination beside the sweep site.
    Side(PopId, PopId),
}

/// The event loop: repeatedly samples the earliest of the competing event
/// channels, executes it against the demography, and streams the
/// resulting ARG edges to the reporter. Runs strictly backward in time
/// until every roster is empty or no event can ever occur again.
pub struct Simulator<G: GeneticMap, M: MutationPlacer, R: Rng> {
    demography: Demography<G, M>,
    queue: HistoricalEventQueue,
    sweep: Option<SweepController>,
    rng: R,
    recomb_rate: f64,
    gc_rate: f64,
    gc_mean_tract: f64,
    now: NonNegativeF64,
}

impl<G: GeneticMap, M: MutationPlacer, R: Rng> Simulator<G, M, R> {
    /// # Errors
    ///
    /// Returns `SimulationError::SweepTrajectory` if the model carries a
    /// sweep frequency table whose generations do not strictly increase.
    pub fn new(model: &Model, map: G, placer: M, rng: R) -> Result<Self, SimulationError> {
        let mut demography = Demography::new(map, placer);

        for pop in &model.pops {
            demography.add_pop(pop.name.clone(), pop.size);
        }

        for (index, pop) in model.pops.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            demography.add_samples(PopId::new(index as u32), pop.samples);
        }

        for &(from, to, rate) in &model.migrations {
            demography.migrations_mut().set_rate(from, to, rate);
        }

        let mut queue = HistoricalEventQueue::new();

        for (gen, event) in &model.events {
            queue.push(*gen, event.clone());
        }

        let sweep = match &model.sweep {
            Some(config) => {
                let size = demography.pop(config.pop).size();
                let name = format!("{}.derived", demography.pop(config.pop).name());
                let derived = demography.add_pop(name, size);

                let controller = match &config.trajectory {
                    Some(points) => SweepController::with_table_trajectory(
                        config.pop,
                        derived,
                        config.site,
                        points.clone(),
                        size,
                        model.recomb_rate,
                    )?,
                    None => SweepController::new(
                        config.pop,
                        derived,
                        config.site,
                        config.selection,
                        config.end_freq,
                        config.end_gen,
                        size,
                        model.recomb_rate,
                    ),
                };

                Some(controller)
            }
            None => None,
        };

        Ok(Self {
            demography,
            queue,
            sweep,
            rng,
            recomb_rate: model.recomb_rate.get(),
            gc_rate: model.recomb_rate.get() * model.gc_to_recomb_ratio.get(),
            gc_mean_tract: model.gc_mean_tract.get(),
            now: NonNegativeF64::zero(),
        })
    }

    #[must_use]
    pub fn demography(&self) -> &Demography<G, M> {
        &self.demography
    }

    #[must_use]
    pub fn generation(&self) -> NonNegativeF64 {
        self.now
    }

    #[must_use]
    pub fn sweep(&self) -> Option<&SweepController> {
        self.sweep.as_ref()
    }

    /// Runs the simulation to completion, streaming every structural edge
    /// to `reporter`. Returns the generation of the last event.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::NonConvergence` if an arrival-time
    /// inversion exhausts its step budget.
    pub fn run<P: EdgeReporter>(
        &mut self,
        reporter: &mut P,
    ) -> Result<NonNegativeF64, SimulationError> {
        info!(
            "simulating {} lineages across {} pops",
            self.demography.active_lineages(),
            self.demography.pops().len(),
        );

        while !self.demography.all_rosters_empty() {
            if !self.step(reporter)? {
                debug!("no further event can occur; stopping");
                break;
            }
        }

        // a sweep the coalescences outran still owes its causal mutation
        if let Some(sweep) = &mut self.sweep {
            if sweep.phase() == SweepPhase::Active {
                let resumed = sweep.complete(&mut self.demography, &mut self.rng);

                if resumed > self.now {
                    self.now = resumed;
                }
            }
        }

        self.flush_edges(reporter);
        reporter.report_completion(self.now);

        info!("completed at generation {}", self.now.get());

        Ok(self.now)
    }

    /// One iteration of the event loop. Returns `false` once no event can
    /// ever occur again.
    #[allow(clippy::too_many_lines)]
    fn step<P: EdgeReporter>(&mut self, reporter: &mut P) -> Result<bool, SimulationError> {
        let from = self.now.get();

        let queue_gen = self
            .queue
            .peek_generation()
            .map_or(f64::INFINITY, NonNegativeF64::get);
        let sweep_gen = self
            .sweep
            .as_ref()
            .map_or(f64::INFINITY, SweepController::boundary);

        // channel rates are constant between events, so the earliest of
        // independent candidate arrivals is an exact draw
        let recomb_total = self.demography.recomb_weight_total() * self.recomb_rate;
        let gc_total = self.demography.gc_weight_total() * self.gc_rate;
        let migration_total = self.demography.migration_rate_total();
        let coal_total = self.demography.homogeneous_coal_rate_total();
        let homogeneous = recomb_total + gc_total + migration_total + coal_total;

        let mut next = queue_gen.min(sweep_gen);
        let mut channel = Channel::Boundary;

        if homogeneous > 0.0_f64 {
            let candidate = from + self.rng.sample_exponential(homogeneous);

            if candidate < next {
                next = candidate;
                channel = Channel::Homogeneous;
            }
        }

        for pop in self.demography.pops() {
            if !pop.is_active() || pop.len() < 2 {
                continue;
            }

            let Some(process) = pop.coal_process() else {
                continue;
            };

            #[allow(clippy::cast_precision_loss)]
            let factor = pop.pair_count() as f64;

            let candidate = process.next_arrival_time(
                from,
                next,
                factor,
                &mut self.rng,
                ARRIVAL_EPS,
                ARRIVAL_MAX_STEPS,
            )?;

            if candidate < next {
                next = candidate;
                channel = Channel::PopCoal(pop.id());
            }
        }

        if let Some(sweep) = &self.sweep {
            for (side_from, side_to, process) in sweep.side_channels() {
                let factor = self.demography.side_weight_total(side_from);

                if factor <= 0.0_f64 {
                    continue;
                }

                let candidate = process.next_arrival_time(
                    from,
                    next,
                    factor,
                    &mut self.rng,
                    ARRIVAL_EPS,
                    ARRIVAL_MAX_STEPS,
                )?;

                if candidate < next {
                    next = candidate;
                    channel = Channel::Side(side_from, side_to);
                }
            }
        }

        match channel {
            Channel::Boundary => {
                if next.is_infinite() {
                    return Ok(false);
                }

                self.now = unsafe { NonNegativeF64::new_unchecked(next) };

                if queue_gen <= sweep_gen {
                    if let Some((gen, event)) = self.queue.pop() {
                        match event.execute(gen, &mut self.demography, &mut self.rng) {
                            EventOutcome::Done(resumed) => {
                                if resumed > self.now {
                                    self.now = resumed;
                                }
                            }
                            EventOutcome::Reschedule(resume_gen, successor) => {
                                self.queue.push(resume_gen, successor);
                            }
                        }
                    }
                } else if let Some(sweep) = &mut self.sweep {
                    match sweep.phase() {
                        SweepPhase::Pending => sweep.begin(&mut self.demography, &mut self.rng),
                        SweepPhase::Active => {
                            let resumed = sweep.complete(&mut self.demography, &mut self.rng);

                            if resumed > self.now {
                                self.now = resumed;
                            }
                        }
                        SweepPhase::Done => {}
                    }
                }
            }
            Channel::Homogeneous => {
                self.now = unsafe { NonNegativeF64::new_unchecked(next) };

                let draw = self.rng.sample_uniform() * homogeneous;

                if draw < recomb_total {
                    self.execute_recombination();
                } else if draw < recomb_total + migration_total {
                    self.execute_migration(draw - recomb_total);
                } else if draw < recomb_total + migration_total + coal_total {
                    let target = draw - recomb_total - migration_total;

                    if let Some(pop) = self.demography.pick_coal_pop(target) {
                        self.demography.coalesce_roster_pair(pop, self.now, &mut self.rng);
                    }
                } else {
                    self.execute_gene_conversion();
                }
            }
            Channel::PopCoal(pop) => {
                self.now = unsafe { NonNegativeF64::new_unchecked(next) };

                self.demography.coalesce_roster_pair(pop, self.now, &mut self.rng);
            }
            Channel::Side(side_from, side_to) => {
                self.now = unsafe { NonNegativeF64::new_unchecked(next) };

                if let Some(sweep) = &self.sweep {
                    sweep.execute_side(&mut self.demography, side_from, side_to, &mut self.rng);
                }
            }
        }

        self.flush_edges(reporter);

        Ok(true)
    }

    fn execute_recombination(&mut self) {
        let fraction = unsafe { ClosedOpenUnitF64::new_unchecked(self.rng.sample_uniform()) };
        let (lineage, residue) = self.demography.sample_recomb_lineage(fraction);

        let (hull_beg, _hull_end) = self.demography.lineage(lineage).ancestry().hull();
        let genetic = (self.demography.map().physical_to_genetic(hull_beg).get() + residue)
            .min(1.0_f64);
        let loc = self
            .demography
            .map()
            .genetic_to_physical(unsafe { ClosedUnitF64::new_unchecked(genetic) });

        // rounding can push the locus onto a hull edge, where the split
        // would be structurally empty
        if !self.demography.recombine(lineage, self.now, loc) {
            trace!("recombination locus {loc:?} fell on a hull edge of {lineage:?}");
        }
    }

    fn execute_migration(&mut self, target: f64) {
        let picked = self
            .demography
            .migrations()
            .pick(target, |pop| self.demography.pop(pop).len());

        if let Some(migration) = picked {
            self.demography
                .migrate_one(migration.from, migration.to, self.now, &mut self.rng);
        }
    }

    fn execute_gene_conversion(&mut self) {
        let fraction = unsafe { ClosedOpenUnitF64::new_unchecked(self.rng.sample_uniform()) };
        let (lineage, residue) = self.demography.sample_gc_lineage(fraction);

        let origin = self
            .demography
            .lineage(lineage)
            .ancestry()
            .locate_genetic_offset(residue, self.demography.map());

        // two exponential half-tracts around the initiation point
        let half_rate = 2.0_f64 / self.gc_mean_tract;
        let tract_beg = (origin.get() - self.rng.sample_exponential(half_rate)).max(0.0_f64);
        let tract_end = (origin.get() + self.rng.sample_exponential(half_rate)).min(1.0_f64);

        let converted = self.demography.gene_convert(
            lineage,
            self.now,
            unsafe { ClosedUnitF64::new_unchecked(tract_beg) },
            unsafe { ClosedUnitF64::new_unchecked(tract_end) },
        );

        if !converted {
            trace!("gene-conversion tract missed the live material of {lineage:?}");
        }
    }

    fn flush_edges<P: EdgeReporter>(&mut self, reporter: &mut P) {
        for edge in self.demography.drain_edges() {
            if let Some(sweep) = &self.sweep {
                sweep.handle_edge(&mut self.demography, &edge, &mut self.rng);
            }

            reporter.report_edge(&edge);
        }
    }
}
