//! Ordered asynchronous request submission.
//!
//! `OrderedAsync` drives every client call: it admits the call through a
//! counting semaphore, registers it on the sliding window for its target,
//! and runs the send/retry loop until the call's reply future resolves.
//! Replies reach callers in per-window submission order; terminal failures
//! fail the whole window, because delivering around a gap would break that
//! order.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use alder_client_api::Message;
use alder_client_api::RaftClientReply;
use alder_client_api::RaftClientRequest;
use alder_client_api::RaftPeerId;
use alder_client_api::RequestType;
use alder_client_api::SlidingWindowEntry;
use tokio::sync::Notify;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::client::ClientCore;
use crate::constants::RAFT_WINDOW_KEY;
use crate::errors::RaftClientError;
use crate::observability;
use crate::retry::RetryForeverNoSleep;
use crate::retry::RetryPolicy;
use crate::sliding_window::ClientSideRequest;
use crate::sliding_window::SlidingWindowClient;

type Window = SlidingWindowClient<PendingOrderedRequest>;
type RequestBuilder = Box<dyn Fn(SlidingWindowEntry) -> RaftClientRequest + Send + Sync>;
type ReplyResult = Result<RaftClientReply, RaftClientError>;

/// Write-once completion cell holding a pending request's reply.
struct ReplyCell {
    state: Mutex<Option<ReplyResult>>,
    notify: Notify,
}

impl ReplyCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Store the result if the cell is still empty. Returns whether this
    /// call won the race; losing calls change nothing.
    fn try_complete(&self, result: ReplyResult) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.is_some() {
                return false;
            }
            *state = Some(result);
        }
        self.notify.notify_waiters();
        true
    }

    fn is_done(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    fn peek(&self) -> Option<ReplyResult> {
        self.state.lock().unwrap().clone()
    }

    async fn wait(&self) -> ReplyResult {
        loop {
            let notified = self.notify.notified();
            if let Some(result) = self.peek() {
                return result;
            }
            notified.await;
        }
    }
}

/// One in-flight logical call on a sliding window.
///
/// The sequence number is fixed at submission; the `is_first` flag is sticky
/// and consulted on every rebuild, so a request re-stamped after a leader
/// change carries the anchor on its next trip to the wire.
pub(crate) struct PendingOrderedRequest {
    seq_num: u64,
    is_first: AtomicBool,
    builder: RequestBuilder,
    last_request: Mutex<Option<RaftClientRequest>>,
    attempt_count: AtomicU32,
    reply_cell: ReplyCell,
    /// Admission permit, released exactly once when the reply cell resolves.
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl PendingOrderedRequest {
    fn new(seq_num: u64, builder: RequestBuilder, permit: OwnedSemaphorePermit) -> Self {
        Self {
            seq_num,
            is_first: AtomicBool::new(false),
            builder,
            last_request: Mutex::new(None),
            attempt_count: AtomicU32::new(0),
            reply_cell: ReplyCell::new(),
            permit: Mutex::new(Some(permit)),
        }
    }

    /// Rebuild the concrete request with the current first flag. Does not
    /// touch the attempt counter.
    fn new_request_impl(&self) -> RaftClientRequest {
        let entry = SlidingWindowEntry::new(self.seq_num, self.is_first.load(Ordering::Acquire));
        let request = (self.builder)(entry);
        *self.last_request.lock().unwrap() = Some(request.clone());
        request
    }

    /// Build for a transport submission; counts the attempt.
    fn new_request(&self) -> RaftClientRequest {
        self.attempt_count.fetch_add(1, Ordering::AcqRel);
        self.new_request_impl()
    }

    fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::Acquire)
    }

    fn last_request(&self) -> Option<RaftClientRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn complete(&self, result: ReplyResult) {
        if self.reply_cell.try_complete(result) {
            self.permit.lock().unwrap().take();
        }
    }
}

impl ClientSideRequest for PendingOrderedRequest {
    type Reply = RaftClientReply;
    type Error = RaftClientError;

    fn seq_num(&self) -> u64 {
        self.seq_num
    }

    fn set_first_request(&self) {
        self.is_first.store(true, Ordering::Release);
    }

    fn is_done(&self) -> bool {
        self.reply_cell.is_done()
    }

    fn set_reply(&self, reply: RaftClientReply) {
        self.complete(Ok(reply));
    }

    fn fail(&self, error: RaftClientError) {
        self.complete(Err(error));
    }
}

/// Caller-side handle to an ordered request's reply.
pub struct PendingReply {
    pending: Arc<PendingOrderedRequest>,
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("seq_num", &self.pending.seq_num())
            .field("is_done", &self.pending.is_done())
            .finish()
    }
}

impl PendingReply {
    /// Wait for the reply.
    ///
    /// A reply carrying an embedded Raft exception is surfaced as
    /// [`RaftClientError::Raft`].
    pub async fn recv(self) -> Result<RaftClientReply, RaftClientError> {
        let reply = self.pending.reply_cell.wait().await?;
        match reply.exception {
            Some(exception) => Err(RaftClientError::Raft { source: exception }),
            None => Ok(reply),
        }
    }

    /// Whether the reply future has resolved.
    pub fn is_done(&self) -> bool {
        self.pending.is_done()
    }

    /// Sequence number assigned to this call within its window.
    pub fn seq_num(&self) -> u64 {
        self.pending.seq_num()
    }
}

/// Sends ordered asynchronous requests to a Raft service.
pub(crate) struct OrderedAsync {
    core: Arc<ClientCore>,
    /// Window per target key; leader-directed traffic shares one window,
    /// stale reads get one per server.
    windows: RwLock<HashMap<String, Arc<Window>>>,
    admission: Arc<Semaphore>,
}

impl OrderedAsync {
    pub(crate) fn new(core: Arc<ClientCore>) -> Arc<Self> {
        let admission = Arc::new(Semaphore::new(core.config.max_outstanding_requests));
        Arc::new(Self {
            core,
            windows: RwLock::new(HashMap::new()),
            admission,
        })
    }

    fn window_key(request_type: &RequestType, server: Option<&RaftPeerId>) -> String {
        match (request_type, server) {
            (RequestType::StaleRead { .. }, Some(server)) => server.to_string(),
            _ => RAFT_WINDOW_KEY.to_string(),
        }
    }

    fn window(&self, key: &str) -> Arc<Window> {
        if let Some(window) = self.windows.read().unwrap().get(key) {
            return Arc::clone(window);
        }
        let mut windows = self.windows.write().unwrap();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(SlidingWindowClient::new(format!("{}->{}", self.core.client_id, key))));
        Arc::clone(window)
    }

    /// Admit, register, and start one ordered call.
    ///
    /// Blocks while the client is at its outstanding-request limit. The
    /// request is never registered if admission is interrupted.
    pub(crate) async fn send(
        self: Arc<Self>,
        request_type: RequestType,
        message: Option<Message>,
        server: Option<RaftPeerId>,
    ) -> Result<PendingReply, RaftClientError> {
        if message.is_none() && !request_type.is_watch() {
            return Err(RaftClientError::InvalidRequest {
                reason: format!("{request_type} requests require a message"),
            });
        }
        if request_type.is_stale_read() && server.is_none() {
            return Err(RaftClientError::InvalidRequest {
                reason: "stale reads require a target server".to_string(),
            });
        }

        let permit = Arc::clone(&self.admission).acquire_owned().await.map_err(|_| {
            RaftClientError::Interrupted {
                operation: format!("waiting for admission of a {request_type} request"),
            }
        })?;

        let call_id = ClientCore::next_call_id();
        let trace_context = observability::current_trace_context();
        let window = self.window(&Self::window_key(&request_type, server.as_ref()));

        let core = Arc::clone(&self.core);
        let builder: RequestBuilder = Box::new(move |entry| {
            core.new_client_request(server.clone(), call_id, message.clone(), request_type.clone(), entry, trace_context.clone())
        });

        let this = Arc::clone(&self);
        let send_window = Arc::clone(&window);
        let pending = window.submit_new_request(
            |seq_num| PendingOrderedRequest::new(seq_num, builder, permit),
            |pending| Arc::clone(&this).spawn_attempt(Arc::clone(&send_window), Arc::clone(pending)),
        );

        Ok(PendingReply { pending })
    }

    /// Launch one attempt of the send/retry loop as its own task.
    fn spawn_attempt(self: Arc<Self>, window: Arc<Window>, pending: Arc<PendingOrderedRequest>) {
        tokio::spawn(self.send_request_with_retry(window, pending));
    }

    async fn send_request_with_retry(self: Arc<Self>, window: Arc<Window>, pending: Arc<PendingOrderedRequest>) {
        if pending.is_done() {
            trace!(seq_num = pending.seq_num(), "skipping attempt for completed request");
            return;
        }
        let retry_with = Arc::clone(&self).send_request(Arc::clone(&window), Arc::clone(&pending)).await;
        if let Some(policy) = retry_with {
            self.schedule_retry(window, pending, policy);
        }
    }

    /// Run a single attempt. Returns the policy to schedule a retry under,
    /// or `None` when the attempt settled the request (delivered, buffered
    /// for in-order delivery, or failed terminally).
    async fn send_request(
        self: Arc<Self>,
        window: Arc<Window>,
        pending: Arc<PendingOrderedRequest>,
    ) -> Option<Arc<dyn RetryPolicy>> {
        if window.is_first(pending.seq_num()) {
            pending.set_first_request();
        }
        let request = pending.new_request();
        let attempt = pending.attempt_count();
        debug!(client_id = %self.core.client_id, %request, attempt, "sending request");

        match self.core.transport.send_request(request.clone()).await {
            Ok(Some(reply)) => {
                debug!(client_id = %self.core.client_id, %reply, "received reply");
                let reply_exception = reply.exception.clone();
                let handled = self.core.handle_leader_reply(&request, reply, || window.reset_first_seq_num());
                match handled {
                    Some(reply) => {
                        let seq_num = request.sliding_window_entry.seq_num;
                        window.receive_reply(seq_num, reply, |next| {
                            Arc::clone(&self).spawn_attempt(Arc::clone(&window), Arc::clone(next))
                        });
                        None
                    }
                    None if self.core.retry_policy.should_retry(attempt, &request) => {
                        Some(Arc::clone(&self.core.retry_policy))
                    }
                    None => {
                        self.fail_window(&window, &request, attempt, reply_exception.map(RaftClientError::from));
                        None
                    }
                }
            }
            Ok(None) => {
                trace!(client_id = %self.core.client_id, %request, "no reply for attempt");
                if self.core.retry_policy.should_retry(attempt, &request) {
                    Some(Arc::clone(&self.core.retry_policy))
                } else {
                    self.fail_window(&window, &request, attempt, None);
                    None
                }
            }
            Err(error) => {
                debug!(client_id = %self.core.client_id, %request, %error, attempt, "request attempt failed");
                self.handle_attempt_failure(window, &request, pending.seq_num(), attempt, error)
            }
        }
    }

    /// Classify a transport failure per the error taxonomy: recover locally
    /// where the retry policy allows, fail the whole window otherwise.
    fn handle_attempt_failure(
        self: Arc<Self>,
        window: Arc<Window>,
        request: &RaftClientRequest,
        seq_num: u64,
        attempt: u32,
        error: RaftClientError,
    ) -> Option<Arc<dyn RetryPolicy>> {
        match error {
            RaftClientError::NotLeader { ref suggested_leader, .. } => {
                if !self.core.retry_policy.should_retry(attempt, request) {
                    self.fail_window(&window, request, attempt, Some(error.clone()));
                    return None;
                }
                let has_hint = suggested_leader.is_some();
                self.core.handle_not_leader_exception(request, suggested_leader.clone(), || {
                    window.reset_first_seq_num()
                });
                if has_hint {
                    Some(Arc::new(RetryForeverNoSleep))
                } else {
                    Some(Arc::clone(&self.core.retry_policy))
                }
            }
            RaftClientError::GroupMismatch { .. } => {
                window.fail(seq_num, error);
                None
            }
            RaftClientError::Io { .. } => {
                if !self.core.retry_policy.should_retry(attempt, request) {
                    self.fail_window(&window, request, attempt, Some(error));
                    None
                } else {
                    self.core.handle_io_exception(request, &error, None, || window.reset_first_seq_num());
                    Some(Arc::clone(&self.core.retry_policy))
                }
            }
            other => {
                window.fail(seq_num, other);
                None
            }
        }
    }

    /// The retry policy refused further attempts: fail the request and, with
    /// it, the whole window.
    fn fail_window(&self, window: &Window, request: &RaftClientRequest, attempt: u32, cause: Option<RaftClientError>) {
        warn!(client_id = %self.core.client_id, %request, attempt, "no more retries; failing window");
        let error = RaftClientError::RetryFailure {
            attempts: attempt,
            cause: cause.map(Box::new),
        };
        window.fail(request.sliding_window_entry.seq_num, error);
    }

    /// Arm the scheduler to re-send `pending` after the policy's sleep.
    /// Scheduling never reassigns the sequence number.
    fn schedule_retry(self: Arc<Self>, window: Arc<Window>, pending: Arc<PendingOrderedRequest>, policy: Arc<dyn RetryPolicy>) {
        let attempt = pending.attempt_count();
        let request = pending.last_request().unwrap_or_else(|| pending.new_request_impl());
        let sleep = policy.sleep_time(attempt, &request);
        debug!(
            client_id = %self.core.client_id,
            %request,
            attempt,
            policy = ?policy,
            sleep_ms = sleep.as_millis() as u64,
            "scheduling retry"
        );
        let described = request.to_string();
        let scheduler = self.core.scheduler;
        scheduler.on_timeout(
            sleep,
            move || {
                window.retry(&pending, |next| Arc::clone(&self).spawn_attempt(Arc::clone(&window), Arc::clone(next)));
            },
            move || format!("failed to fire retry for {described}"),
        );
    }

    /// Total outstanding requests across all windows.
    pub(crate) fn outstanding_requests(&self) -> usize {
        self.windows.read().unwrap().values().map(|window| window.outstanding()).sum()
    }

    /// Stop admitting new requests. Senders blocked on admission observe an
    /// interruption; requests already admitted run to completion.
    pub(crate) fn close(&self) {
        self.admission.close();
    }
}
