//! Raft client handle and leader bookkeeping.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use alder_client_api::ClientId;
use alder_client_api::Message;
use alder_client_api::RaftClientReply;
use alder_client_api::RaftClientRequest;
use alder_client_api::RaftException;
use alder_client_api::RaftGroupId;
use alder_client_api::RaftPeerId;
use alder_client_api::ReplicationLevel;
use alder_client_api::RequestType;
use alder_client_api::SlidingWindowEntry;
use alder_client_api::TraceContext;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::RaftClientConfig;
use crate::constants::DEFAULT_RETRY_BASE_SLEEP;
use crate::constants::DEFAULT_RETRY_MAX_ATTEMPTS;
use crate::constants::DEFAULT_RETRY_MAX_SLEEP;
use crate::errors::RaftClientError;
use crate::ordered::OrderedAsync;
use crate::ordered::PendingReply;
use crate::retry::ExponentialBackoff;
use crate::retry::RetryPolicy;
use crate::scheduler::TimeoutScheduler;
use crate::transport::RaftClientRpc;

/// Process-wide call id source; call ids are unique across every client in
/// the process so servers can deduplicate on `(client_id, call_id)` and logs
/// stay unambiguous.
static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Shared state and collaborators behind a [`RaftClient`].
pub(crate) struct ClientCore {
    pub(crate) client_id: ClientId,
    pub(crate) group_id: RaftGroupId,
    pub(crate) peers: Vec<RaftPeerId>,
    /// Current leader hint; updated by leader-change signals.
    pub(crate) leader: Mutex<RaftPeerId>,
    pub(crate) transport: Arc<dyn RaftClientRpc>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) scheduler: TimeoutScheduler,
    pub(crate) config: RaftClientConfig,
}

impl ClientCore {
    pub(crate) fn next_call_id() -> u64 {
        NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Build the concrete request for one wire trip. Leader-directed
    /// requests resolve the current leader at build time, so a rebuilt
    /// retry lands on the freshest hint.
    pub(crate) fn new_client_request(
        &self,
        server: Option<RaftPeerId>,
        call_id: u64,
        message: Option<Message>,
        request_type: RequestType,
        sliding_window_entry: SlidingWindowEntry,
        trace_context: Option<TraceContext>,
    ) -> RaftClientRequest {
        let server_id = server.unwrap_or_else(|| self.leader.lock().unwrap().clone());
        RaftClientRequest {
            client_id: self.client_id,
            server_id,
            group_id: self.group_id,
            call_id,
            message,
            request_type,
            sliding_window_entry,
            trace_context,
        }
    }

    /// Interpret a reply's embedded exception.
    ///
    /// Leader-change signals are consumed here: the reply converts into a
    /// retry signal (`None`), after updating the leader hint and, for
    /// `NotLeader`, resetting the window through `reset`. Every other reply
    /// passes through for in-order delivery.
    pub(crate) fn handle_leader_reply(
        &self,
        request: &RaftClientRequest,
        reply: RaftClientReply,
        reset: impl FnOnce(),
    ) -> Option<RaftClientReply> {
        match &reply.exception {
            Some(RaftException::NotLeader { suggested_leader }) => {
                warn!(
                    client_id = %self.client_id,
                    %request,
                    suggested = ?suggested_leader,
                    "reply indicates the addressed server is not the leader"
                );
                self.adopt_leader(&request.server_id, suggested_leader.clone());
                reset();
                None
            }
            Some(RaftException::LeaderNotReady) => {
                debug!(client_id = %self.client_id, %request, "leader not ready; will retry");
                None
            }
            _ => Some(reply),
        }
    }

    /// Transport-level not-leader rejection: adopt the hinted leader (or
    /// rotate to the next peer) and reset the window anchor.
    pub(crate) fn handle_not_leader_exception(
        &self,
        request: &RaftClientRequest,
        suggested_leader: Option<RaftPeerId>,
        reset: impl FnOnce(),
    ) {
        warn!(
            client_id = %self.client_id,
            %request,
            suggested = ?suggested_leader,
            "server rejected request as non-leader"
        );
        self.adopt_leader(&request.server_id, suggested_leader);
        reset();
    }

    /// Transport-level I/O failure: if the failed server was the leader
    /// hint, rotate to `new_leader` or the next known peer and reset the
    /// window anchor.
    pub(crate) fn handle_io_exception(
        &self,
        request: &RaftClientRequest,
        error: &RaftClientError,
        new_leader: Option<RaftPeerId>,
        reset: impl FnOnce(),
    ) {
        warn!(client_id = %self.client_id, %request, %error, "i/o failure talking to server");
        let mut leader = self.leader.lock().unwrap();
        if *leader != request.server_id {
            return;
        }
        let next = new_leader.or_else(|| self.next_peer(&request.server_id));
        if let Some(next) = next {
            info!(client_id = %self.client_id, old = %leader, new = %next, "rotating leader after i/o failure");
            *leader = next;
        }
        drop(leader);
        reset();
    }

    fn adopt_leader(&self, rejecting: &RaftPeerId, suggested: Option<RaftPeerId>) {
        let mut leader = self.leader.lock().unwrap();
        match suggested {
            Some(next) => {
                if *leader != next {
                    info!(client_id = %self.client_id, old = %leader, new = %next, "updating known leader");
                    *leader = next;
                }
            }
            None => {
                if *leader == *rejecting {
                    if let Some(next) = self.next_peer(rejecting) {
                        info!(client_id = %self.client_id, old = %leader, new = %next, "rotating to next peer");
                        *leader = next;
                    }
                }
            }
        }
    }

    fn next_peer(&self, after: &RaftPeerId) -> Option<RaftPeerId> {
        if self.peers.is_empty() {
            return None;
        }
        match self.peers.iter().position(|peer| peer == after) {
            Some(index) => Some(self.peers[(index + 1) % self.peers.len()].clone()),
            None => self.peers.first().cloned(),
        }
    }
}

/// Client for sending ordered asynchronous requests to a Raft group.
///
/// Writes, linearizable reads, and watches are routed to the current leader
/// hint and share one sliding window; stale reads go straight to the chosen
/// server on a dedicated window. Replies for one window resolve in
/// submission order.
pub struct RaftClient {
    core: Arc<ClientCore>,
    ordered: Arc<OrderedAsync>,
}

impl RaftClient {
    pub fn builder() -> RaftClientBuilder {
        RaftClientBuilder::default()
    }

    pub fn id(&self) -> &ClientId {
        &self.core.client_id
    }

    pub fn group_id(&self) -> &RaftGroupId {
        &self.core.group_id
    }

    /// The current leader hint.
    pub fn leader(&self) -> RaftPeerId {
        self.core.leader.lock().unwrap().clone()
    }

    /// Submit a write to the leader.
    pub async fn send(&self, message: impl Into<Message>) -> Result<PendingReply, RaftClientError> {
        Arc::clone(&self.ordered).send(RequestType::Write, Some(message.into()), None).await
    }

    /// Submit a linearizable read to the leader.
    pub async fn send_read_only(&self, message: impl Into<Message>) -> Result<PendingReply, RaftClientError> {
        Arc::clone(&self.ordered).send(RequestType::Read, Some(message.into()), None).await
    }

    /// Submit a read of `server`'s possibly stale state. The reply is
    /// ordered against other stale reads to the same server only.
    pub async fn send_stale_read(
        &self,
        message: impl Into<Message>,
        min_index: u64,
        server: RaftPeerId,
    ) -> Result<PendingReply, RaftClientError> {
        Arc::clone(&self.ordered)
            .send(RequestType::StaleRead { min_index }, Some(message.into()), Some(server))
            .await
    }

    /// Watch `index` until it reaches `replication`. Watches carry no
    /// message.
    pub async fn watch(&self, index: u64, replication: ReplicationLevel) -> Result<PendingReply, RaftClientError> {
        Arc::clone(&self.ordered).send(RequestType::Watch { index, replication }, None, None).await
    }

    /// Requests admitted but not yet completed, across all windows.
    pub fn outstanding_requests(&self) -> usize {
        self.ordered.outstanding_requests()
    }

    /// Stop admitting new requests. Calls blocked on admission fail with
    /// [`RaftClientError::Interrupted`]; admitted requests run to
    /// completion.
    pub fn close(&self) {
        info!(client_id = %self.core.client_id, "closing client");
        self.ordered.close();
    }
}

/// Builder for [`RaftClient`].
#[derive(Default)]
pub struct RaftClientBuilder {
    client_id: Option<ClientId>,
    group_id: Option<RaftGroupId>,
    peers: Vec<RaftPeerId>,
    leader: Option<RaftPeerId>,
    transport: Option<Arc<dyn RaftClientRpc>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    config: Option<RaftClientConfig>,
}

impl RaftClientBuilder {
    /// Override the generated client identity.
    pub fn client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn group_id(mut self, group_id: RaftGroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Known peers of the group, used for leader rotation on failure.
    pub fn peers(mut self, peers: Vec<RaftPeerId>) -> Self {
        self.peers = peers;
        self
    }

    /// Initial leader hint; defaults to the first peer.
    pub fn leader(mut self, leader: RaftPeerId) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn RaftClientRpc>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Retry policy for failed attempts; defaults to capped exponential
    /// backoff.
    pub fn retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn config(mut self, config: RaftClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<RaftClient, RaftClientError> {
        let transport = self.transport.ok_or_else(|| RaftClientError::InvalidRequest {
            reason: "a transport is required".to_string(),
        })?;
        let leader = match self.leader.or_else(|| self.peers.first().cloned()) {
            Some(leader) => leader,
            None => {
                return Err(RaftClientError::InvalidRequest {
                    reason: "at least one peer or an explicit leader is required".to_string(),
                });
            }
        };
        let config = self.config.unwrap_or_default().validate()?;
        let retry_policy = self.retry_policy.unwrap_or_else(|| {
            Arc::new(ExponentialBackoff::new(
                DEFAULT_RETRY_BASE_SLEEP,
                DEFAULT_RETRY_MAX_SLEEP,
                DEFAULT_RETRY_MAX_ATTEMPTS,
            ))
        });

        let core = Arc::new(ClientCore {
            client_id: self.client_id.unwrap_or_else(ClientId::random),
            group_id: self.group_id.unwrap_or_else(RaftGroupId::random),
            peers: self.peers,
            leader: Mutex::new(leader),
            transport,
            retry_policy,
            scheduler: TimeoutScheduler::new(),
            config,
        });
        debug!(client_id = %core.client_id, group_id = %core.group_id, "built raft client");

        Ok(RaftClient {
            ordered: OrderedAsync::new(Arc::clone(&core)),
            core,
        })
    }
}
