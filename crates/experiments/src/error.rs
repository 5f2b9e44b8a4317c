use thiserror::Error;

pub type ExperimentResult<T> = Result<T, ExperimentError>;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Experiment name must not be empty")]
    EmptyName,

    #[error("Experiment '{0}' has no variants")]
    NoVariants(String),

    #[error("Experiment '{experiment}' lists variant '{variant}' more than once")]
    DuplicateVariant { experiment: String, variant: String },

    #[error("Experiment '{0}' is defined more than once")]
    DuplicateExperiment(String),

    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
