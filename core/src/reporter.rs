use argsim_core_bond::NonNegativeF64;

use crate::event::EdgeEvent;

/// Subscriber to the stream of structural ARG edges. Events are delivered
/// strictly after the operation that produced them has completed, in
/// generation order.
pub trait EdgeReporter {
    fn report_edge(&mut self, edge: &EdgeEvent);

    /// The generation at which the whole demography finished coalescing.
    fn report_completion(&mut self, _generation: NonNegativeF64) {}
}

#[allow(clippy::module_name_repetitions)]
pub struct NullEdgeReporter;

impl EdgeReporter for NullEdgeReporter {
    fn report_edge(&mut self, _edge: &EdgeEvent) {}
}

impl<'r, R: EdgeReporter> EdgeReporter for &'r mut R {
    fn report_edge(&mut self, edge: &EdgeEvent) {
        (**self).report_edge(edge);
    }

    fn report_completion(&mut self, generation: NonNegativeF64) {
        (**self).report_completion(generation);
    }
}
