//! Deterministic in-memory collaborators for Alder client tests.
//!
//! This crate provides a scripted, non-persistent implementation of the
//! client's transport seam for use in unit tests and deterministic
//! simulation of failure scenarios. It mirrors the behavior of a real Raft
//! service without network I/O.
//!
//! # Key Types
//!
//! - [`DeterministicRaftService`]: scripted in-memory [`RaftClientRpc`]
//! - [`Outcome`]: what one transport attempt should produce
//! - [`ReplyGate`]: holds an attempt open until the test releases it
//!
//! # Example
//!
//! ```ignore
//! let service = DeterministicRaftService::new();
//! service.enqueue(1, Outcome::NoReply);          // first attempt: retry signal
//! // second attempt falls back to the default success echo
//!
//! let client = RaftClient::builder()
//!     .peers(vec![RaftPeerId::from("s1")])
//!     .transport(service.clone())
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use alder_client::RaftClientError;
use alder_client::RaftClientRpc;
use alder_client_api::Message;
use alder_client_api::RaftClientReply;
use alder_client_api::RaftClientRequest;
use alder_client_api::RaftException;
use alder_client_api::SlidingWindowEntry;
use async_trait::async_trait;
use tokio::sync::Notify;

/// Installs a compact tracing subscriber for test output.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted result of a single transport attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Successful reply echoing the request's message.
    Success,
    /// Successful reply carrying the given payload.
    Reply(Message),
    /// Well-formed reply embedding a Raft exception.
    Exception(RaftException),
    /// Transport-level "no reply yet" retry signal.
    NoReply,
    /// Transport failure.
    Fail(RaftClientError),
    /// Block until the test releases the gate with a concrete outcome.
    Gated(Arc<ReplyGate>),
}

/// A held transport attempt.
///
/// The service parks the attempt on the gate; the test later calls
/// [`release`](Self::release) to let it finish with a concrete outcome.
pub struct ReplyGate {
    slot: Mutex<Option<Outcome>>,
    notify: Notify,
}

impl ReplyGate {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        })
    }

    /// Release the held attempt with `outcome`.
    pub fn release(&self, outcome: Outcome) {
        *self.slot.lock().unwrap() = Some(outcome);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> Outcome {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self.slot.lock().unwrap().clone() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for ReplyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let released = self.slot.lock().unwrap().is_some();
        f.debug_struct("ReplyGate").field("released", &released).finish()
    }
}

/// Scripted in-memory implementation of [`RaftClientRpc`] for testing.
///
/// Every received request is recorded in arrival order. Outcomes are
/// scripted per sequence number and consumed in arrival order; attempts
/// with no scripted outcome get a successful reply echoing the request.
pub struct DeterministicRaftService {
    requests: Mutex<Vec<RaftClientRequest>>,
    outcomes: Mutex<HashMap<u64, VecDeque<Outcome>>>,
}

impl DeterministicRaftService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
        })
    }

    /// Script the next outcome for attempts carrying `seq_num`.
    ///
    /// Multiple outcomes for the same sequence number are consumed in the
    /// order they were enqueued.
    pub fn enqueue(&self, seq_num: u64, outcome: Outcome) {
        self.outcomes.lock().unwrap().entry(seq_num).or_default().push_back(outcome);
    }

    /// Every request received so far, in arrival order.
    pub fn sent_requests(&self) -> Vec<RaftClientRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The sliding-window headers of every request, in arrival order.
    pub fn wire_entries(&self) -> Vec<SlidingWindowEntry> {
        self.requests.lock().unwrap().iter().map(|request| request.sliding_window_entry).collect()
    }

    /// Requests that carried `seq_num`, in arrival order.
    pub fn requests_for_seq(&self, seq_num: u64) -> Vec<RaftClientRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.sliding_window_entry.seq_num == seq_num)
            .cloned()
            .collect()
    }

    fn next_outcome(&self, seq_num: u64) -> Outcome {
        self.outcomes
            .lock()
            .unwrap()
            .get_mut(&seq_num)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Success)
    }
}

#[async_trait]
impl RaftClientRpc for DeterministicRaftService {
    async fn send_request(&self, request: RaftClientRequest) -> Result<Option<RaftClientReply>, RaftClientError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut outcome = self.next_outcome(request.sliding_window_entry.seq_num);
        while let Outcome::Gated(gate) = outcome {
            outcome = gate.wait().await;
        }

        let log_index = request.sliding_window_entry.seq_num;
        match outcome {
            Outcome::Success => Ok(Some(RaftClientReply::success(&request, request.message.clone(), log_index))),
            Outcome::Reply(message) => Ok(Some(RaftClientReply::success(&request, Some(message), log_index))),
            Outcome::Exception(exception) => Ok(Some(RaftClientReply::exception(&request, exception))),
            Outcome::NoReply => Ok(None),
            Outcome::Fail(error) => Err(error),
            Outcome::Gated(_) => unreachable!("gates are resolved above"),
        }
    }
}
