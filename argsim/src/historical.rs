use core::cmp::{Ordering, Reverse};

use fnv::{FnvBuildHasher, FnvHashMap};
use priority_queue::PriorityQueue;

use argsim_core_bond::{ClosedUnitF64, NonNegativeF64, PositiveF64};

use argsim_core::{
    cogs::{GeneticMap, MutationPlacer, Rng},
    population::PopId,
};
use argsim_impls::{arrival::ArrivalProcess, rate_function::RateFunction};

use crate::demography::Demography;

/// Generation stride of the stepped exponential size change.
const EXPANSION_STEP: f64 = 10.0;

/// A scheduled demographic-model change. Multi-step events return a
/// successor to reschedule instead of mutating shared queue state.
#[derive(Debug, Clone)]
pub enum HistoricalEvent {
    /// Sets the pop size.
    ChangeSize { pop: PopId, size: PositiveF64 },
    /// Walks the pop size exponentially from its value at the scheduled
    /// generation to `final_size` at `end_gen`, in fixed steps,
    /// rescheduling itself along the way.
    ExpChangeSize {
        pop: PopId,
        end_gen: NonNegativeF64,
        final_size: PositiveF64,
        started: Option<(NonNegativeF64, PositiveF64)>,
    },
    /// The exact variant: installs a closed-form exponential coalescence
    /// process on the pop for the duration of the change.
    ExpChangeSizeExact {
        pop: PopId,
        end_gen: NonNegativeF64,
        final_size: PositiveF64,
    },
    /// Internal successor of `ExpChangeSizeExact`.
    ExpChangeSizeExactEnd { pop: PopId, final_size: PositiveF64 },
    /// Instantaneous bottleneck of inbreeding strength `inbreeding`,
    /// realized as forced coalescences over one generation at effective
    /// size `-1 / (2 ln(1 - inbreeding))`.
    Bottleneck {
        pop: PopId,
        inbreeding: ClosedUnitF64,
    },
    /// Backward-time population split: every lineage of `from` moves into
    /// `to`, migrations touching `from` are dropped, `from` goes inactive.
    Split { from: PopId, to: PopId },
    /// Admixture: each lineage of `admixed` traces back to `source` with
    /// probability `fraction`.
    Admix {
        admixed: PopId,
        source: PopId,
        fraction: ClosedUnitF64,
    },
    MigrationRateChange {
        from: PopId,
        to: PopId,
        rate: NonNegativeF64,
    },
}

pub enum EventOutcome {
    /// The generation at which the simulation resumes.
    Done(NonNegativeF64),
    /// Resume generation plus a successor event to schedule there.
    Reschedule(NonNegativeF64, HistoricalEvent),
}

impl HistoricalEvent {
    pub fn execute<G: GeneticMap, M: MutationPlacer, R: Rng>(
        self,
        now: NonNegativeF64,
        demography: &mut Demography<G, M>,
        rng: &mut R,
    ) -> EventOutcome {
        match self {
            Self::ChangeSize { pop, size } => {
                demography.pop_mut(pop).set_size(size);

                EventOutcome::Done(now)
            }
            Self::ExpChangeSize {
                pop,
                end_gen,
                final_size,
                started,
            } => {
                let (start_gen, start_size) =
                    started.unwrap_or((now, demography.pop(pop).size()));

                let span = end_gen.get() - start_gen.get();
                let fraction = ((now.get() - start_gen.get()) / span).min(1.0_f64);

                let size = start_size.get()
                    * (final_size.get() / start_size.get()).powf(fraction);

                demography
                    .pop_mut(pop)
                    .set_size(unsafe { PositiveF64::new_unchecked(size) });

                if now < end_gen {
                    let next = unsafe {
                        NonNegativeF64::new_unchecked(
                            (now.get() + EXPANSION_STEP).min(end_gen.get()),
                        )
                    };

                    EventOutcome::Reschedule(
                        next,
                        Self::ExpChangeSize {
                            pop,
                            end_gen,
                            final_size,
                            started: Some((start_gen, start_size)),
                        },
                    )
                } else {
                    EventOutcome::Done(now)
                }
            }
            Self::ExpChangeSizeExact {
                pop,
                end_gen,
                final_size,
            } => {
                let start_size = demography.pop(pop).size();
                let span = end_gen.get() - now.get();

                // N(t) = N0 * (Nf/N0)^((t - now)/span), so the pair
                // coalescence rate 1/(4N(t)) is a pure exponential
                let exponent = (start_size.get() / final_size.get()).ln() / span;
                let coeff =
                    unsafe { NonNegativeF64::new_unchecked(1.0_f64 / (4.0_f64 * start_size.get())) };

                demography.set_coal_process(
                    pop,
                    ArrivalProcess::new(RateFunction::exponential(coeff, exponent, now)),
                );

                EventOutcome::Reschedule(end_gen, Self::ExpChangeSizeExactEnd { pop, final_size })
            }
            Self::ExpChangeSizeExactEnd { pop, final_size } => {
                demography.clear_coal_process(pop);
                demography.pop_mut(pop).set_size(final_size);

                EventOutcome::Done(now)
            }
            Self::Bottleneck { pop, inbreeding } => {
                let effective_size = -1.0_f64 / (2.0_f64 * inbreeding.one_minus().get().ln());

                let mut elapsed = 0.0_f64;
                let mut g = now;

                while demography.pop(pop).len() >= 2 {
                    let k = demography.pop(pop).len();

                    #[allow(clippy::cast_precision_loss)]
                    let rate = ((k * (k - 1)) as f64) / (4.0_f64 * effective_size);

                    elapsed += rng.sample_exponential(rate);

                    if elapsed >= 1.0_f64 {
                        break;
                    }

                    g = PositiveF64::max_after(
                        g,
                        unsafe { NonNegativeF64::new_unchecked(now.get() + elapsed) },
                    )
                    .into();

                    demography.coalesce_roster_pair(pop, g, rng);
                }

                EventOutcome::Done(g)
            }
            Self::Split { from, to } => {
                while let Some(&lineage) = demography.pop(from).roster().first() {
                    demography.move_lineage(lineage, to);
                }

                demography.migrations_mut().remove_involving(from);
                demography.pop_mut(from).deactivate();

                EventOutcome::Done(now)
            }
            Self::Admix {
                admixed,
                source,
                fraction,
            } => {
                let count =
                    rng.sample_binomial(demography.pop(admixed).len(), fraction.get());

                for _ in 0..count {
                    let roster = demography.pop(admixed).roster();
                    let lineage = roster[rng.sample_index(roster.len())];

                    demography.move_lineage(lineage, source);
                }

                EventOutcome::Done(now)
            }
            Self::MigrationRateChange { from, to, rate } => {
                demography.migrations_mut().set_rate(from, to, rate);

                EventOutcome::Done(now)
            }
        }
    }
}

/// Min-order wrapper so the max-priority queue pops the earliest
/// generation first.
#[derive(PartialEq, Eq, Copy, Clone)]
struct EventTime(NonNegativeF64);

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
struct EventOrder {
    time: EventTime,
    // FIFO among equal generations keeps replays deterministic
    seq: Reverse<u64>,
}

/// Time-ordered queue of scheduled demographic changes.
#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct HistoricalEventQueue {
    queue: PriorityQueue<u64, EventOrder, FnvBuildHasher>,
    events: FnvHashMap<u64, HistoricalEvent>,
    next_seq: u64,
}

impl HistoricalEventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::with_default_hasher(),
            events: FnvHashMap::default(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, generation: NonNegativeF64, event: HistoricalEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.queue.push(
            seq,
            EventOrder {
                time: EventTime(generation),
                seq: Reverse(seq),
            },
        );
        self.events.insert(seq, event);
    }

    #[must_use]
    pub fn peek_generation(&self) -> Option<NonNegativeF64> {
        self.queue.peek().map(|(_, order)| order.time.0)
    }

    pub fn pop(&mut self) -> Option<(NonNegativeF64, HistoricalEvent)> {
        let (seq, order) = self.queue.pop()?;
        let event = self.events.remove(&seq)?;

        Some((order.time.0, event))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use argsim_core_bond::{NonNegativeF64, PositiveF64};

    use argsim_core::population::PopId;

    use argsim_impls::{
        genetic_map::UniformGeneticMap, mutation::NullMutationPlacer, rng::SeededRng,
    };

    use super::{EventOutcome, HistoricalEvent, HistoricalEventQueue};
    use crate::demography::Demography;

    fn resize(index: u32, size: f64) -> HistoricalEvent {
        HistoricalEvent::ChangeSize {
            pop: PopId::new(index),
            size: PositiveF64::try_from(size).unwrap(),
        }
    }

    #[test]
    fn events_pop_in_generation_then_insertion_order() {
        let mut queue = HistoricalEventQueue::new();

        queue.push(NonNegativeF64::try_from(7.0).unwrap(), resize(0, 1.0));
        queue.push(NonNegativeF64::try_from(3.0).unwrap(), resize(1, 1.0));
        queue.push(NonNegativeF64::try_from(7.0).unwrap(), resize(2, 1.0));

        assert_eq!(queue.peek_generation(), NonNegativeF64::new(3.0).ok());

        let order: Vec<u32> = core::iter::from_fn(|| {
            queue.pop().map(|(_, event)| match event {
                HistoricalEvent::ChangeSize { pop, .. } =>
                {
                    #[allow(clippy::cast_possible_truncation)]
                    (pop.index() as u32)
                }
                _ => unreachable!(),
            })
        })
        .collect();

        assert_eq!(order, vec![1, 0, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn stepped_and_exact_size_changes_agree_on_the_final_size() {
        let drive = |event: HistoricalEvent| {
            let mut demography: Demography<UniformGeneticMap, NullMutationPlacer> =
                Demography::new(UniformGeneticMap, NullMutationPlacer);
            demography.add_pop(String::from("deme"), PositiveF64::try_from(1_000.0).unwrap());

            let mut rng = SeededRng::from_seed(1);
            let mut queue = HistoricalEventQueue::new();
            queue.push(NonNegativeF64::zero(), event);

            while let Some((gen, event)) = queue.pop() {
                match event.execute(gen, &mut demography, &mut rng) {
                    EventOutcome::Done(_) => (),
                    EventOutcome::Reschedule(next, successor) => queue.push(next, successor),
                }
            }

            demography
        };

        let pop = PopId::new(0);
        let end_gen = NonNegativeF64::try_from(95.0).unwrap();
        let final_size = PositiveF64::try_from(250.0).unwrap();

        let stepped = drive(HistoricalEvent::ExpChangeSize {
            pop,
            end_gen,
            final_size,
            started: None,
        });
        let exact = drive(HistoricalEvent::ExpChangeSizeExact {
            pop,
            end_gen,
            final_size,
        });

        assert!((stepped.pop(pop).size().get() - 250.0).abs() < 1.0e-9);
        assert!((exact.pop(pop).size().get() - 250.0).abs() < 1.0e-9);
        assert!(exact.pop(pop).coal_process().is_none());
    }
}
