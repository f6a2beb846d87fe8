use argsim_core::{
    event::{EdgeEvent, EdgeKind},
    reporter::EdgeReporter,
};

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct EdgeCountReporter {
    coalescences: usize,
    recombinations: usize,
    gene_conversions: usize,
}

impl EdgeReporter for EdgeCountReporter {
    fn report_edge(&mut self, edge: &EdgeEvent) {
        match edge.kind {
            EdgeKind::Coalescence => self.coalescences += 1,
            EdgeKind::Recombination => self.recombinations += 1,
            EdgeKind::GeneConversion => self.gene_conversions += 1,
        }
    }
}

impl EdgeCountReporter {
    #[must_use]
    pub fn coalescences(&self) -> usize {
        self.coalescences
    }

    #[must_use]
    pub fn recombinations(&self) -> usize {
        self.recombinations
    }

    #[must_use]
    pub fn gene_conversions(&self) -> usize {
        self.gene_conversions
    }
}
