//! Transport seam between the client core and the Raft service.

use alder_client_api::RaftClientReply;
use alder_client_api::RaftClientRequest;
use async_trait::async_trait;

use crate::errors::RaftClientError;

/// Asynchronous RPC endpoint the client core sends requests through.
///
/// Implementations report routing and I/O problems through
/// [`RaftClientError::NotLeader`], [`RaftClientError::GroupMismatch`], and
/// [`RaftClientError::Io`]; any other error variant is treated as terminal
/// for the request's window. `Ok(None)` means the service produced no reply
/// for this attempt and the client should retry under its policy.
#[async_trait]
pub trait RaftClientRpc: Send + Sync {
    /// Send one request and wait for its transport-level outcome.
    async fn send_request(&self, request: RaftClientRequest) -> Result<Option<RaftClientReply>, RaftClientError>;
}
