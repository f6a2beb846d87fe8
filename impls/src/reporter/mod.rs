mod count;
mod record;

pub use count::EdgeCountReporter;
pub use record::RecordingEdgeReporter;
