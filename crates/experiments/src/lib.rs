//! Client-side A/B testing: experiment definitions, sticky variant
//! assignment and the variant copy catalog read by presentation code.

pub mod assigner;
pub mod catalog;
pub mod error;
pub mod experiment;

pub use assigner::VariantAssigner;
pub use catalog::{ExperimentCatalog, ResolvedExperiment, VariantConfig};
pub use error::{ExperimentError, ExperimentResult};
pub use experiment::{select_variant, Experiment};
