use argsim_core_bond::NonNegativeF64;

use argsim_core::{event::EdgeEvent, reporter::EdgeReporter};

/// Keeps the full edge stream, for ARG export and for checking that runs
/// with the same seed reproduce bit-identically.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct RecordingEdgeReporter {
    edges: Vec<EdgeEvent>,
    completion: Option<NonNegativeF64>,
}

impl EdgeReporter for RecordingEdgeReporter {
    fn report_edge(&mut self, edge: &EdgeEvent) {
        self.edges.push(edge.clone());
    }

    fn report_completion(&mut self, generation: NonNegativeF64) {
        self.completion = Some(generation);
    }
}

impl RecordingEdgeReporter {
    #[must_use]
    pub fn edges(&self) -> &[EdgeEvent] {
        &self.edges
    }

    #[must_use]
    pub fn completion(&self) -> Option<NonNegativeF64> {
        self.completion
    }
}
