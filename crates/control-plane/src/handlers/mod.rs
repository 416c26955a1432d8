// Task handlers executed by the worker pool

pub mod enrich;

pub use enrich::{split_labels, EnrichmentHandler, DATA_MODELS};
