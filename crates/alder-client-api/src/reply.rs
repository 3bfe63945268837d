//! Client reply types.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::exception::RaftException;
use crate::request::RaftClientRequest;
use crate::types::ClientId;
use crate::types::Message;
use crate::types::RaftGroupId;
use crate::types::RaftPeerId;

/// A reply from a Raft service to a client request.
///
/// A reply is well-formed even when the operation failed: Raft-level failures
/// travel in [`exception`](Self::exception), not through the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaftClientReply {
    /// Client the reply is addressed to.
    pub client_id: ClientId,
    /// Server that produced the reply.
    pub server_id: RaftPeerId,
    /// Raft group of the serving node.
    pub group_id: RaftGroupId,
    /// Call id echoed from the request.
    pub call_id: u64,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Result payload, if the operation produced one.
    pub message: Option<Message>,
    /// Raft-level failure embedded in the reply, if any.
    pub exception: Option<RaftException>,
    /// Log index the operation committed at, or 0 when not applicable.
    pub log_index: u64,
}

impl RaftClientReply {
    /// Build a successful reply echoing the request's identifiers.
    pub fn success(request: &RaftClientRequest, message: Option<Message>, log_index: u64) -> Self {
        Self {
            client_id: request.client_id,
            server_id: request.server_id.clone(),
            group_id: request.group_id,
            call_id: request.call_id,
            success: true,
            message,
            exception: None,
            log_index,
        }
    }

    /// Build a failed reply carrying an embedded Raft exception.
    pub fn exception(request: &RaftClientRequest, exception: RaftException) -> Self {
        Self {
            client_id: request.client_id,
            server_id: request.server_id.clone(),
            group_id: request.group_id,
            call_id: request.call_id,
            success: false,
            message: None,
            exception: Some(exception),
            log_index: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success && self.exception.is_none()
    }
}

impl fmt::Display for RaftClientReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<-{} cid={} success={}", self.client_id, self.server_id, self.call_id, self.success)?;
        if let Some(exception) = &self.exception {
            write!(f, " exception={exception}")?;
        }
        Ok(())
    }
}
