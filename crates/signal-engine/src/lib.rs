//! Signal processing: filter, enrichment, scoring, and threshold gating.

pub mod enrichment;
pub mod filter;
pub mod pipeline;
pub mod scorer;
pub mod threshold;

pub use enrichment::{TokenEnricher, WalletEnricher};
pub use filter::{FilterResult, SignalFilter};
pub use pipeline::{PipelineOutcome, SignalPipeline};
pub use scorer::SignalScorer;
pub use threshold::ThresholdGate;
