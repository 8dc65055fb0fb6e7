use thiserror::Error;

/// Hard failures per the error taxonomy in spec §7. Recoverable kinds
/// (`EmptyExtraction`, `ParseBoundary`, `UnreachableSource`,
/// `TransportFailure`) are absorbed locally and surfaced as structured
/// fields on output records instead of through this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("target index {0} is not present in the capture")]
    InvariantViolation(usize),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
