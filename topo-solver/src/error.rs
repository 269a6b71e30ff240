/// Errors produced while configuring or running an optimization.
///
/// Optimizer non-convergence is not an error. A stage that runs out of
/// evaluations just reports its [`StopReason`][crate::optimizer::StopReason].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Size mismatch for {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("Invalid projection: eta = {eta}, beta = {beta}")]
    InvalidProjection { eta: f64, beta: f64 },

    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("Invalid design region {name:?}: {reason}")]
    InvalidRegion { name: String, reason: String },

    #[error("Invalid optimizer settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("Simulation failed")]
    Simulation(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("Optimizer failed: {reason}")]
    Optimizer { reason: String },

    #[error("Image error")]
    Image(#[from] image::ImageError),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn check_size(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        }
        else {
            Err(Self::SizeMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}
