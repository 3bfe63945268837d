//! Identity and payload types shared by requests and replies.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Unique identity of a client instance.
///
/// Generated once per client and carried on every request so servers can
/// deduplicate retries by `(client_id, call_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh random client identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", &self.0.as_simple().to_string()[..8])
    }
}

/// Identity of a single Raft peer (server).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaftPeerId(String);

impl RaftPeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RaftPeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RaftPeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RaftPeerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Identity of a Raft group.
///
/// Every request carries the group id it was built for; servers reject
/// requests whose group does not match theirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaftGroupId(Uuid);

impl RaftGroupId {
    /// Generate a fresh random group identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RaftGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", &self.0.as_simple().to_string()[..8])
    }
}

/// Opaque request or reply payload.
///
/// The client core never interprets the content; it is handed to the state
/// machine on the server side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    content: Vec<u8>,
}

impl Message {
    pub fn new(content: Vec<u8>) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl From<Vec<u8>> for Message {
    fn from(content: Vec<u8>) -> Self {
        Self::new(content)
    }
}

impl From<&[u8]> for Message {
    fn from(content: &[u8]) -> Self {
        Self::new(content.to_vec())
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Self::new(content.as_bytes().to_vec())
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Self::new(content.into_bytes())
    }
}

/// Durability level a watch request waits for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationLevel {
    /// Committed by a majority of peers.
    #[default]
    Majority,
    /// Replicated to all peers.
    All,
    /// Majority-committed and applied on a majority.
    MajorityCommitted,
    /// Replicated and applied on all peers.
    AllCommitted,
}

impl fmt::Display for ReplicationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationLevel::Majority => "MAJORITY",
            ReplicationLevel::All => "ALL",
            ReplicationLevel::MajorityCommitted => "MAJORITY_COMMITTED",
            ReplicationLevel::AllCommitted => "ALL_COMMITTED",
        };
        f.write_str(name)
    }
}
