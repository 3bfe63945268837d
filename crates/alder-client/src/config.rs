//! Client configuration.

use crate::constants::DEFAULT_MAX_OUTSTANDING_REQUESTS;
use crate::errors::RaftClientError;

/// Configuration for the ordered asynchronous client.
#[derive(Debug, Clone)]
pub struct RaftClientConfig {
    /// Upper bound on requests admitted but not yet completed, summed across
    /// all sliding windows. `send` blocks once the bound is reached.
    pub max_outstanding_requests: usize,
}

impl Default for RaftClientConfig {
    fn default() -> Self {
        Self {
            max_outstanding_requests: DEFAULT_MAX_OUTSTANDING_REQUESTS,
        }
    }
}

impl RaftClientConfig {
    /// Validate the configuration, returning it unchanged on success.
    pub fn validate(self) -> Result<Self, RaftClientError> {
        if self.max_outstanding_requests == 0 {
            return Err(RaftClientError::InvalidRequest {
                reason: "max_outstanding_requests must be positive".to_string(),
            });
        }
        Ok(self)
    }
}
