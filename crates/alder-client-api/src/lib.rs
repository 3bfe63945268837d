//! Wire protocol types for the Alder Raft client.
//!
//! This crate defines the request/reply pairs exchanged between a client and
//! a Raft service, without pulling in the client core or any transport. It is
//! designed for transport implementations and servers that only need the
//! protocol surface.
//!
//! # Key Components
//!
//! - [`RaftClientRequest`] / [`RaftClientReply`]: the request/reply pair
//! - [`RequestType`]: write, read, stale read, or watch
//! - [`SlidingWindowEntry`]: per-window ordering header (wire-critical)
//! - [`RaftException`]: Raft-level errors a server can embed in a reply
//! - [`TraceContext`]: trace context carried for distributed tracing

mod exception;
mod reply;
mod request;
mod trace;
mod types;

pub use exception::RaftException;
pub use reply::RaftClientReply;
pub use request::RaftClientRequest;
pub use request::RequestType;
pub use request::SlidingWindowEntry;
pub use trace::InvalidTraceparent;
pub use trace::TraceContext;
pub use types::ClientId;
pub use types::Message;
pub use types::RaftGroupId;
pub use types::RaftPeerId;
pub use types::ReplicationLevel;
