use thiserror::Error;

/// Failures that abort a solve call.
///
/// Non-convergence is not an error; it is reported through
/// [`SolveStats::converged`](crate::solver::args::SolveStats). An unrecognized
/// preconditioner name is also not an error; it falls back to the identity
/// preconditioner with a warning.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The caller's connectivity or buffers failed validation. Nothing was
    /// uploaded to the device.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Adapter selection, device creation, or a device-side operation failed.
    /// The in-progress solve is abandoned; the caller's solution buffer is
    /// left untouched.
    #[error("device failure: {reason}")]
    Device { reason: String },
}

impl SolveError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn device(reason: impl Into<String>) -> Self {
        Self::Device {
            reason: reason.into(),
        }
    }
}
