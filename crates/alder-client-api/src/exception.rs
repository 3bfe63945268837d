//! Raft-level exceptions a server can embed in an otherwise well-formed reply.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::types::RaftGroupId;
use crate::types::RaftPeerId;
use crate::types::ReplicationLevel;

/// Errors the Raft service reports through the reply payload rather than the
/// transport.
///
/// `NotLeader` and `LeaderNotReady` are recoverable routing signals consumed
/// by the client's retry machinery; the remaining variants surface to the
/// caller.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftException {
    /// The addressed server is not the current leader.
    #[error("server is not the leader; suggested leader: {suggested_leader:?}")]
    NotLeader {
        /// Leader hint from the rejecting server, if it has one.
        suggested_leader: Option<RaftPeerId>,
    },

    /// The leader has not yet committed an entry from its current term.
    #[error("leader is not ready to serve requests")]
    LeaderNotReady,

    /// The request's group id does not match the server's group.
    #[error("request group {group_id} does not match the server's group")]
    GroupMismatch {
        /// Group id the request carried.
        group_id: RaftGroupId,
    },

    /// The state machine failed while applying the request.
    #[error("state machine error: {message}")]
    StateMachine {
        /// Server-side failure description.
        message: String,
    },

    /// A watched index did not reach the requested replication level.
    #[error("call {call_id} not replicated to {replication} at index {log_index}")]
    NotReplicated {
        /// Call id of the watch request.
        call_id: u64,
        /// Replication level that was requested.
        replication: ReplicationLevel,
        /// Log index that was watched.
        log_index: u64,
    },
}

impl RaftException {
    /// True for exceptions that signal a leadership problem the client can
    /// recover from by retrying against another server.
    pub fn is_leader_signal(&self) -> bool {
        matches!(self, RaftException::NotLeader { .. } | RaftException::LeaderNotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_leader_is_a_leader_signal() {
        let exception = RaftException::NotLeader {
            suggested_leader: Some(RaftPeerId::from("s2")),
        };
        assert!(exception.is_leader_signal());
        assert!(RaftException::LeaderNotReady.is_leader_signal());
    }

    #[test]
    fn state_machine_is_not_a_leader_signal() {
        let exception = RaftException::StateMachine {
            message: "apply failed".to_string(),
        };
        assert!(!exception.is_leader_signal());
        assert_eq!(exception.to_string(), "state machine error: apply failed");
    }
}
