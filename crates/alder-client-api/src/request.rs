//! Client request types.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::trace::TraceContext;
use crate::types::ClientId;
use crate::types::Message;
use crate::types::RaftGroupId;
use crate::types::RaftPeerId;
use crate::types::ReplicationLevel;

/// The kind of operation a client request performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    /// Replicated state-machine write, routed to the leader.
    Write,
    /// Linearizable read, routed to the leader.
    Read,
    /// Read against a specific server's possibly stale state.
    StaleRead {
        /// Minimum applied log index the serving replica must have reached.
        min_index: u64,
    },
    /// Wait until the given log index reaches the requested replication level.
    Watch {
        /// Log index being watched.
        index: u64,
        /// Durability level to wait for.
        replication: ReplicationLevel,
    },
}

impl RequestType {
    pub fn is_stale_read(&self) -> bool {
        matches!(self, RequestType::StaleRead { .. })
    }

    pub fn is_watch(&self) -> bool {
        matches!(self, RequestType::Watch { .. })
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Write => f.write_str("RW"),
            RequestType::Read => f.write_str("RO"),
            RequestType::StaleRead { min_index } => write!(f, "StaleRead({min_index})"),
            RequestType::Watch { index, replication } => match replication {
                ReplicationLevel::Majority => write!(f, "Watch({index})"),
                other => write!(f, "Watch-{other}({index})"),
            },
        }
    }
}

/// Per-window ordering header carried by every client request.
///
/// This is the one structure the server depends on for sliding-window
/// bookkeeping: `seq_num` orders requests within a window, and `is_first`
/// marks the request that anchors the window. Exactly one outstanding request
/// per window carries `is_first = true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowEntry {
    /// Sequence number, unique and ascending within one window.
    pub seq_num: u64,
    /// Whether this request anchors the window.
    pub is_first: bool,
}

impl SlidingWindowEntry {
    pub fn new(seq_num: u64, is_first: bool) -> Self {
        Self { seq_num, is_first }
    }
}

impl fmt::Display for SlidingWindowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_first {
            write!(f, "{}*", self.seq_num)
        } else {
            write!(f, "{}", self.seq_num)
        }
    }
}

/// A request from a client to a Raft service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaftClientRequest {
    /// Identity of the sending client.
    pub client_id: ClientId,
    /// The server this request is addressed to.
    pub server_id: RaftPeerId,
    /// The Raft group this request belongs to.
    pub group_id: RaftGroupId,
    /// Process-wide call id, for server-side deduplication and logs.
    pub call_id: u64,
    /// Payload; absent for watch requests.
    pub message: Option<Message>,
    /// Operation kind.
    pub request_type: RequestType,
    /// Ordering header for the client's sliding window.
    pub sliding_window_entry: SlidingWindowEntry,
    /// Trace context captured when the call was submitted, if any.
    pub trace_context: Option<TraceContext>,
}

impl fmt::Display for RaftClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}@{} cid={} seq={} {}",
            self.client_id, self.server_id, self.group_id, self.call_id, self.sliding_window_entry, self.request_type,
        )
    }
}
