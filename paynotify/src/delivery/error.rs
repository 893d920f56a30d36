use thiserror::Error;

/// Failure of one delivery attempt, or of the whole retry sequence.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Request could not be built or sent, or no response arrived in time
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Endpoint answered with a non-2xx status
    #[error("endpoint responded with HTTP {status}")]
    Status { status: u16 },

    /// Every allowed attempt failed, or the elapsed ceiling was reached first
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: Box<DeliveryError> },
}

impl DeliveryError {
    /// HTTP status of the failed attempt, if the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Transport(e) => e.status().map(|s| s.as_u16()),
            DeliveryError::Status { status } => Some(*status),
            DeliveryError::RetriesExhausted { last_error, .. } => last_error.status(),
        }
    }
}
