use log::{debug, trace};

use argsim_core_bond::{ClosedOpenUnitF64, ClosedUnitF64, NonNegativeF64, PositiveF64};

use argsim_core::{
    cogs::{GeneticMap, MutationPlacer, Rng},
    event::{EdgeEvent, EdgeKind},
    leafset::Leafset,
    lineage::LineageId,
    population::PopId,
};
use argsim_impls::{
    arrival::ArrivalProcess,
    rate_function::{RateFunction, RateFunctionError},
};

use crate::demography::Demography;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    /// The simulation has not yet reached the sweep's end generation.
    Pending,
    /// Between the end and start generations: the sweep pop is split into
    /// a derived and an ancestral frequency class.
    Active,
    Done,
}

/// Derived-allele frequency going backward from the sweep's end
/// generation, either as the closed-form deterministic logistic decay or
/// as a supplied step table.
enum Trajectory {
    Logistic { shape: f64, steepness: f64 },
    Table(Vec<(NonNegativeF64, ClosedUnitF64)>),
}

/// Orchestrates a single selective sweep: splits the swept pop into
/// derived and ancestral frequency classes at the sweep's end generation,
/// drives class-conditioned coalescence and cross-class recombination
/// while active, and at the sweep's start generation forces the derived
/// class down to the branch that receives the causal mutation.
pub struct SweepController {
    pop: PopId,
    derived: PopId,
    site: ClosedUnitF64,
    end_gen: NonNegativeF64,
    start_gen: NonNegativeF64,
    end_freq: f64,
    eps: f64,
    trajectory: Trajectory,
    phase: SweepPhase,
    causal_leaves: Leafset,
    coal_ancestral: ArrivalProcess,
    coal_derived: ArrivalProcess,
    side_to_derived: ArrivalProcess,
    side_to_ancestral: ArrivalProcess,
}

impl SweepController {
    /// Deterministic sweep: the frequency decays logistically from the
    /// (clamped) end frequency down to `1/(2N)`, which fixes the sweep's
    /// start generation in closed form.
    #[must_use]
    #[allow(clippy::similar_names)]
    pub fn new(
        pop: PopId,
        derived: PopId,
        site: ClosedUnitF64,
        selection: PositiveF64,
        end_freq: ClosedUnitF64,
        end_gen: NonNegativeF64,
        pop_size: PositiveF64,
        recomb_rate: NonNegativeF64,
    ) -> Self {
        let eps = 1.0_f64 / (2.0_f64 * pop_size.get());
        let x = end_freq.get().clamp(eps, 1.0_f64 - eps);

        let shape = (1.0_f64 - x) / x;
        let steepness = selection.get();

        // generations until x(g) decays to eps
        let duration =
            ((x * (1.0_f64 - eps)) / ((1.0_f64 - x) * eps)).ln() / steepness;
        let start_gen =
            unsafe { NonNegativeF64::new_unchecked(end_gen.get() + duration.max(0.0_f64)) };

        let quarter_n = 1.0_f64 / (4.0_f64 * pop_size.get());

        // pair rate within the derived class: 1 / (4N x(g))
        let coal_derived = RateFunction::sum(
            RateFunction::constant(unsafe { NonNegativeF64::new_unchecked(quarter_n) }),
            RateFunction::exponential(
                unsafe { NonNegativeF64::new_unchecked(shape * quarter_n) },
                steepness,
                end_gen,
            ),
        );

        // within the ancestral class: 1 / (4N (1 - x(g)))
        let coal_ancestral = RateFunction::sum(
            RateFunction::constant(unsafe { NonNegativeF64::new_unchecked(quarter_n) }),
            RateFunction::exponential(
                unsafe { NonNegativeF64::new_unchecked(quarter_n / shape) },
                -steepness,
                end_gen,
            ),
        );

        let one = unsafe { PositiveF64::new_unchecked(1.0_f64) };

        // a lineage beside the site recombines onto the other class's
        // background at rate rho * gap * x(g) (resp. 1 - x(g))
        let side_to_derived = RateFunction::scaled(
            recomb_rate,
            RateFunction::logistic(
                one,
                unsafe { PositiveF64::new_unchecked(shape) },
                steepness,
                end_gen,
            ),
        );
        let side_to_ancestral = RateFunction::scaled(
            recomb_rate,
            RateFunction::logistic(
                one,
                unsafe { PositiveF64::new_unchecked(1.0_f64 / shape) },
                -steepness,
                end_gen,
            ),
        );

        Self {
            pop,
            derived,
            site,
            end_gen,
            start_gen,
            end_freq: x,
            eps,
            trajectory: Trajectory::Logistic { shape, steepness },
            phase: SweepPhase::Pending,
            causal_leaves: Leafset::empty(),
            coal_ancestral: ArrivalProcess::new(coal_ancestral),
            coal_derived: ArrivalProcess::new(coal_derived),
            side_to_derived: ArrivalProcess::new(side_to_derived),
            side_to_ancestral: ArrivalProcess::new(side_to_ancestral),
        }
    }

    /// Sweep driven by an explicit frequency table. `points` are
    /// `(generation, frequency)` steps, strictly increasing in generation
    /// from the sweep's end generation; the last generation becomes the
    /// sweep's start.
    ///
    /// # Errors
    ///
    /// Returns `RateFunctionError` if the table is empty or its
    /// generations do not strictly increase.
    #[allow(clippy::similar_names)]
    pub fn with_table_trajectory(
        pop: PopId,
        derived: PopId,
        site: ClosedUnitF64,
        points: Vec<(NonNegativeF64, ClosedUnitF64)>,
        pop_size: PositiveF64,
        recomb_rate: NonNegativeF64,
    ) -> Result<Self, RateFunctionError> {
        let eps = 1.0_f64 / (2.0_f64 * pop_size.get());
        let quarter_n = 1.0_f64 / (4.0_f64 * pop_size.get());

        let step_rates = |to_rate: &dyn Fn(f64) -> f64| -> Result<RateFunction, RateFunctionError> {
            RateFunction::piecewise(
                points
                    .iter()
                    .map(|&(gen, freq)| {
                        let x = freq.get().clamp(eps, 1.0_f64 - eps);

                        (gen, unsafe { NonNegativeF64::new_unchecked(to_rate(x)) })
                    })
                    .collect(),
            )
        };

        let coal_derived = step_rates(&|x| quarter_n / x)?;
        let coal_ancestral = step_rates(&|x| quarter_n / (1.0_f64 - x))?;
        let side_to_derived = step_rates(&|x| recomb_rate.get() * x)?;
        let side_to_ancestral = step_rates(&|x| recomb_rate.get() * (1.0_f64 - x))?;

        // non-empty by the piecewise checks above
        let end_gen = points[0].0;
        let start_gen = points[points.len() - 1].0;
        let end_freq = points[0].1.get().clamp(eps, 1.0_f64 - eps);

        Ok(Self {
            pop,
            derived,
            site,
            end_gen,
            start_gen,
            end_freq,
            eps,
            trajectory: Trajectory::Table(points),
            phase: SweepPhase::Pending,
            causal_leaves: Leafset::empty(),
            coal_ancestral: ArrivalProcess::new(coal_ancestral),
            coal_derived: ArrivalProcess::new(coal_derived),
            side_to_derived: ArrivalProcess::new(side_to_derived),
            side_to_ancestral: ArrivalProcess::new(side_to_ancestral),
        })
    }

    #[must_use]
    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    #[must_use]
    pub fn site(&self) -> ClosedUnitF64 {
        self.site
    }

    #[must_use]
    pub fn start_gen(&self) -> NonNegativeF64 {
        self.start_gen
    }

    #[must_use]
    pub fn causal_leaves(&self) -> &Leafset {
        &self.causal_leaves
    }

    /// The next generation at which the controller must take over.
    #[must_use]
    pub fn boundary(&self) -> f64 {
        match self.phase {
            SweepPhase::Pending => self.end_gen.get(),
            SweepPhase::Active => self.start_gen.get(),
            SweepPhase::Done => f64::INFINITY,
        }
    }

    /// Derived-allele frequency at backward generation `g`, clamped to
    /// `[1/(2N), 1 - 1/(2N)]`.
    #[must_use]
    pub fn frequency_at(&self, g: f64) -> f64 {
        let x = match &self.trajectory {
            Trajectory::Logistic { shape, steepness } => {
                1.0_f64 / (1.0_f64 + shape * (steepness * (g - self.end_gen.get())).exp())
            }
            Trajectory::Table(points) => {
                let position = points.partition_point(|(gen, _)| gen.get() <= g);

                points[position.saturating_sub(1)].1.get()
            }
        };

        x.clamp(self.eps, 1.0_f64 - self.eps)
    }

    /// The cross-class recombination channels while the sweep is active,
    /// as `(from, to, process)`; the process's rate factor is the `from`
    /// pop's side-weight total.
    #[must_use]
    pub fn side_channels(&self) -> Vec<(PopId, PopId, &ArrivalProcess)> {
        match self.phase {
            SweepPhase::Active => vec![
                (self.pop, self.derived, &self.side_to_derived),
                (self.derived, self.pop, &self.side_to_ancestral),
            ],
            _ => Vec::new(),
        }
    }

    /// Splits the swept pop into its frequency classes at the sweep's end
    /// generation and installs the class-conditioned coalescence
    /// processes.
    #[debug_requires(self.phase == SweepPhase::Pending)]
    #[debug_ensures(self.phase == SweepPhase::Active)]
    pub fn begin<G: GeneticMap, M: MutationPlacer, R: Rng>(
        &mut self,
        demography: &mut Demography<G, M>,
        rng: &mut R,
    ) {
        demography.install_sweep_site(self.site, &[self.pop, self.derived]);

        let roster: Vec<_> = demography.pop(self.pop).roster().to_vec();

        for lineage in roster {
            if !rng.sample_event(self.end_freq) {
                continue;
            }

            if let Some(leaves) = demography.lineage(lineage).ancestry().leafset_at(self.site) {
                self.causal_leaves.union_with(leaves);
            }

            demography.move_lineage(lineage, self.derived);
        }

        demography.set_coal_process(self.pop, self.coal_ancestral.clone());
        demography.set_coal_process(self.derived, self.coal_derived.clone());

        debug!(
            "sweep began at {:?}: {} derived / {} ancestral lineages",
            self.end_gen,
            demography.pop(self.derived).len(),
            demography.pop(self.pop).len(),
        );

        self.phase = SweepPhase::Active;
    }

    /// Moves one side-weighted lineage of `from` onto the other class's
    /// background.
    pub fn execute_side<G: GeneticMap, M: MutationPlacer, R: Rng>(
        &self,
        demography: &mut Demography<G, M>,
        from: PopId,
        to: PopId,
        rng: &mut R,
    ) {
        if demography.side_weight_total(from) <= 0.0_f64 {
            return;
        }

        let fraction = unsafe { ClosedOpenUnitF64::new_unchecked(rng.sample_uniform()) };
        let lineage = demography.sample_side_lineage(from, fraction);

        trace!("side recombination moves {lineage:?} from {from:?} to {to:?}");

        demography.move_lineage(lineage, to);
    }

    /// Reassigns one parent of a recombination or gene-conversion edge
    /// between the frequency classes: the piece cut off on the far side of
    /// the breakpoint from the causal site lands on a derived chromosome
    /// with the trajectory's probability, while the parent between the
    /// breakpoint and the site stays on the child's background.
    pub fn handle_edge<G: GeneticMap, M: MutationPlacer, R: Rng>(
        &self,
        demography: &mut Demography<G, M>,
        edge: &EdgeEvent,
        rng: &mut R,
    ) {
        if self.phase != SweepPhase::Active
            || (edge.pop != self.pop && edge.pop != self.derived)
            || edge.kind == EdgeKind::Coalescence
        {
            return;
        }

        // the far parent is the non-carrier whose hull lies farthest from
        // the site; a parent carrying the site keeps its class outright
        let far_parent = edge
            .parents
            .iter()
            .copied()
            .filter(|&parent| !demography.lineage(parent).ancestry().contains(self.site))
            .max_by(|&a, &b| {
                self.site_gap(demography, a)
                    .total_cmp(&self.site_gap(demography, b))
            });

        if let Some(parent) = far_parent {
            let x = self.frequency_at(edge.generation.get());

            let target = if rng.sample_event(x) {
                self.derived
            } else {
                self.pop
            };

            if demography.lineage(parent).pop() != target {
                demography.move_lineage(parent, target);
            }
        }
    }

    /// Physical distance from the causal site to a lineage's hull, zero
    /// when the hull straddles the site.
    fn site_gap<G: GeneticMap, M: MutationPlacer>(
        &self,
        demography: &Demography<G, M>,
        lineage: LineageId,
    ) -> f64 {
        let (hull_beg, hull_end) = demography.lineage(lineage).ancestry().hull();

        if self.site <= hull_beg {
            hull_beg.get() - self.site.get()
        } else if self.site >= hull_end {
            self.site.get() - hull_end.get()
        } else {
            0.0_f64
        }
    }

    /// Closes the sweep at its start generation: forces the remaining
    /// derived lineages to coalesce, places the causal mutation on the
    /// branch where the allele arose, and merges the classes back.
    /// Returns the generation the simulation resumes at.
    #[debug_requires(self.phase == SweepPhase::Active)]
    #[debug_ensures(self.phase == SweepPhase::Done)]
    pub fn complete<G: GeneticMap, M: MutationPlacer, R: Rng>(
        &mut self,
        demography: &mut Demography<G, M>,
        rng: &mut R,
    ) -> NonNegativeF64 {
        let mut g = self.start_gen;

        while demography.pop(self.derived).len() >= 2 {
            g = PositiveF64::max_after(g, g).into();

            demography.coalesce_roster_pair(self.derived, g, rng);
        }

        if !self.causal_leaves.is_empty() {
            demography.place_causal_mutation(&self.causal_leaves, g, self.pop, self.site);
        }

        while let Some(&lineage) = demography.pop(self.derived).roster().first() {
            demography.move_lineage(lineage, self.pop);
        }

        demography.pop_mut(self.derived).deactivate();
        demography.clear_coal_process(self.pop);
        demography.clear_coal_process(self.derived);
        demography.clear_sweep_site();

        debug!("sweep completed at {g:?}");

        self.phase = SweepPhase::Done;

        g
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::{ClosedUnitF64, NonNegativeF64, PositiveF64};

    use argsim_core::population::PopId;

    use argsim_impls::{
        genetic_map::UniformGeneticMap, mutation::NullMutationPlacer, rng::SeededRng,
    };

    use super::SweepController;
    use crate::demography::Demography;

    fn controller(end_freq: f64, selection: f64, size: f64) -> SweepController {
        SweepController::new(
            PopId::new(0),
            PopId::new(1),
            ClosedUnitF64::try_from(0.5).unwrap(),
            PositiveF64::try_from(selection).unwrap(),
            ClosedUnitF64::try_from(end_freq).unwrap(),
            NonNegativeF64::zero(),
            PositiveF64::try_from(size).unwrap(),
            NonNegativeF64::zero(),
        )
    }

    #[test]
    fn frequency_decays_from_end_frequency_to_eps() {
        let sweep = controller(0.9, 0.05, 1_000.0);

        assert!((sweep.frequency_at(0.0) - 0.9).abs() < 1.0e-12);
        assert!(sweep.frequency_at(50.0) < 0.9);

        // at the start generation the frequency has hit 1/(2N)
        let eps = 1.0 / 2_000.0;
        let at_start = sweep.frequency_at(sweep.start_gen().get());
        assert!((at_start - eps).abs() < 1.0e-9, "frequency {at_start}");
    }

    #[test]
    fn stronger_selection_shortens_the_sweep() {
        let weak = controller(0.9, 0.01, 1_000.0);
        let strong = controller(0.9, 0.1, 1_000.0);

        assert!(strong.start_gen() < weak.start_gen());
    }

    #[test]
    fn recombination_keeps_the_near_parent_on_the_childs_background() {
        let size = PositiveF64::try_from(1.0e6).unwrap();
        let site = ClosedUnitF64::try_from(0.9).unwrap();

        let mut demography: Demography<UniformGeneticMap, NullMutationPlacer> =
            Demography::new(UniformGeneticMap, NullMutationPlacer);

        let ancestral = demography.add_pop(String::from("deme"), size);
        let derived = demography.add_pop(String::from("deme.derived"), size);

        demography.add_samples(ancestral, 1);

        let mut sweep = SweepController::new(
            ancestral,
            derived,
            site,
            PositiveF64::try_from(0.05).unwrap(),
            ClosedUnitF64::one(),
            NonNegativeF64::zero(),
            size,
            NonNegativeF64::try_from(0.5).unwrap(),
        );

        let mut rng = SeededRng::from_seed(7);

        // end frequency 1.0 puts the single sample on the derived background
        sweep.begin(&mut demography, &mut rng);

        let child = demography.pop(derived).roster()[0];

        // cut away [0.5, 1]: the remaining piece no longer spans the site
        assert!(demography.recombine(
            child,
            NonNegativeF64::try_from(1.0).unwrap(),
            ClosedUnitF64::try_from(0.5).unwrap(),
        ));

        let beside = demography.drain_edges().pop().unwrap().parents[0];
        assert!(!demography.lineage(beside).ancestry().contains(site));
        assert!(demography.lineage(beside).pop() == derived);

        // at the sweep's start generation the derived frequency sits at
        // 1/(2N), so the re-randomized piece lands ancestral
        let late = sweep.start_gen();
        assert!(demography.recombine(beside, late, ClosedUnitF64::try_from(0.25).unwrap()));

        let edge = demography.drain_edges().pop().unwrap();
        sweep.handle_edge(&mut demography, &edge, &mut rng);

        // only the piece on the far side of the breakpoint from the site
        // changes class; the near parent stays with the child
        assert!(
            demography.lineage(edge.parents[1]).pop() == derived,
            "the parent between the breakpoint and the site keeps the child's class"
        );
        assert!(
            demography.lineage(edge.parents[0]).pop() == ancestral,
            "the far parent re-randomizes against the trajectory"
        );
    }

    #[test]
    fn frequency_is_clamped_into_the_open_interval() {
        let sweep = controller(1.0, 0.05, 1_000.0);

        let eps = 1.0 / 2_000.0;
        assert!(sweep.frequency_at(0.0) <= 1.0 - eps);
        assert!(sweep.frequency_at(1.0e9) >= eps);
    }
}
