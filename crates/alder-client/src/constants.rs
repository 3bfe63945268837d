//! Client tuning constants.

use std::time::Duration;

/// Default bound on requests admitted but not yet completed, across all
/// sliding windows.
///
/// Bounded to prevent a stalled window from buffering unbounded state.
pub const DEFAULT_MAX_OUTSTANDING_REQUESTS: usize = 100;

/// Default base sleep between retry attempts.
pub const DEFAULT_RETRY_BASE_SLEEP: Duration = Duration::from_millis(150);

/// Default cap on exponential retry sleeps.
pub const DEFAULT_RETRY_MAX_SLEEP: Duration = Duration::from_secs(5);

/// Default maximum transport attempts per request.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 10;

/// Window key shared by all leader-directed requests.
///
/// Stale reads bypass the leader and get a dedicated window per target
/// server, keyed by the server id instead.
pub const RAFT_WINDOW_KEY: &str = "RAFT";
