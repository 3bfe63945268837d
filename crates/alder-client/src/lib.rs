//! Ordered asynchronous client core for a Raft consensus service.
//!
//! This crate submits a stream of client requests (writes, linearizable
//! reads, stale reads, watches) to a Raft service while preserving per-client
//! submission order, bounding concurrent in-flight requests, and recovering
//! from leader changes and transient failures.
//!
//! The heart of the crate is the sliding-window sequencer: outgoing requests
//! receive monotonically increasing sequence numbers, are multiplexed onto
//! per-target sliding windows (one shared window for leader-directed traffic,
//! one per server for stale reads), and their replies are surfaced to callers
//! strictly in submission order. Exactly one request per window carries the
//! `is_first` anchor flag on the wire at any time; leader changes reset the
//! anchor so the new leader can rebuild its window.
//!
//! # Key Components
//!
//! - [`RaftClient`]: the client handle; build one with [`RaftClientBuilder`]
//! - [`RaftClientRpc`]: transport seam implemented by the RPC layer
//! - [`RetryPolicy`]: decides whether and when failed attempts retry
//! - [`PendingReply`]: caller-side handle resolving to the ordered reply
//! - [`SlidingWindowClient`]: the per-target ordering window
//!
//! # Example
//!
//! ```rust,ignore
//! use alder_client::RaftClient;
//! use alder_client_api::RaftPeerId;
//!
//! let client = RaftClient::builder()
//!     .group_id(group)
//!     .peers(vec![RaftPeerId::from("s1"), RaftPeerId::from("s2")])
//!     .transport(transport)
//!     .build()?;
//!
//! let pending = client.send("set x = 1").await?;
//! let reply = pending.recv().await?;
//! ```

mod client;
mod config;
mod constants;
mod errors;
mod observability;
mod ordered;
mod retry;
mod scheduler;
pub mod sliding_window;
mod transport;

// Re-export the protocol types alongside the client.
pub use alder_client_api::ClientId;
pub use alder_client_api::Message;
pub use alder_client_api::RaftClientReply;
pub use alder_client_api::RaftClientRequest;
pub use alder_client_api::RaftException;
pub use alder_client_api::RaftGroupId;
pub use alder_client_api::RaftPeerId;
pub use alder_client_api::ReplicationLevel;
pub use alder_client_api::RequestType;
pub use alder_client_api::SlidingWindowEntry;
pub use alder_client_api::TraceContext;
pub use client::RaftClient;
pub use client::RaftClientBuilder;
pub use config::RaftClientConfig;
pub use constants::DEFAULT_MAX_OUTSTANDING_REQUESTS;
pub use constants::DEFAULT_RETRY_BASE_SLEEP;
pub use constants::DEFAULT_RETRY_MAX_ATTEMPTS;
pub use constants::DEFAULT_RETRY_MAX_SLEEP;
pub use constants::RAFT_WINDOW_KEY;
pub use errors::RaftClientError;
pub use observability::current_trace_context;
pub use observability::TraceScope;
pub use ordered::PendingReply;
pub use retry::ExponentialBackoff;
pub use retry::RetryForeverNoSleep;
pub use retry::RetryLimited;
pub use retry::RetryPolicy;
pub use scheduler::TimeoutScheduler;
pub use sliding_window::ClientSideRequest;
pub use sliding_window::SlidingWindowClient;
pub use transport::RaftClientRpc;
