//! Error types for client operations.

use alder_client_api::RaftException;
use alder_client_api::RaftPeerId;
use thiserror::Error;

/// Errors surfaced by the ordered asynchronous client.
///
/// Transport implementations report failures with the `NotLeader`,
/// `GroupMismatch`, and `Io` variants; the client core consumes the
/// recoverable ones and surfaces the rest to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RaftClientError {
    /// The caller was cut off before the request was registered, typically
    /// because the client was closed while waiting for admission.
    #[error("interrupted while {operation}")]
    Interrupted {
        /// What the caller was doing when it was interrupted.
        operation: String,
    },

    /// The addressed server rejected the request because it is not the
    /// leader.
    #[error("server {server_id} is not the leader; suggested leader: {suggested_leader:?}")]
    NotLeader {
        /// Server that rejected the request.
        server_id: RaftPeerId,
        /// Leader hint from the rejecting server, if it has one.
        suggested_leader: Option<RaftPeerId>,
    },

    /// The server rejected the request's group id. Terminal for the whole
    /// window.
    #[error("group mismatch on server {server_id}: {reason}")]
    GroupMismatch {
        /// Server that rejected the request.
        server_id: RaftPeerId,
        /// Server-side rejection description.
        reason: String,
    },

    /// An I/O failure talking to a server, subject to the retry policy.
    #[error("i/o failure talking to {server_id}: {reason}")]
    Io {
        /// Server the failed attempt was addressed to.
        server_id: RaftPeerId,
        /// Failure description.
        reason: String,
    },

    /// The reply carried an embedded Raft exception.
    #[error("raft error: {source}")]
    Raft {
        /// The embedded exception.
        #[from]
        source: RaftException,
    },

    /// The retry policy refused further attempts; the whole window failed.
    #[error("request failed and no more retries are allowed after {attempts} attempt(s)")]
    RetryFailure {
        /// Transport attempts made before giving up.
        attempts: u32,
        /// The failure that exhausted the policy, if one was observed.
        cause: Option<Box<RaftClientError>>,
    },

    /// The request was malformed and never submitted.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request.
        reason: String,
    },
}

impl RaftClientError {
    /// True for failures the retry machinery may recover from locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RaftClientError::NotLeader { .. } | RaftClientError::Io { .. })
    }
}
