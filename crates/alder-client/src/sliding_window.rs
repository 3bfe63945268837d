//! Client-side sliding window over outstanding ordered requests.
//!
//! A window assigns ascending sequence numbers to submitted requests, tracks
//! them until completion, and surfaces replies to callers strictly in
//! sequence order. The outstanding request with the smallest sequence number
//! is the window's *first* request: its wire flag anchors the server's
//! per-client window, and exactly one outstanding request carries it at any
//! time.
//!
//! The window's mutex protects only bookkeeping. Completions and re-sends
//! are collected under the lock and run after it is released, so no caller
//! code and no I/O ever executes inside the critical section.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;
use tracing::trace;
use tracing::warn;

/// An outstanding request tracked by a [`SlidingWindowClient`].
///
/// Implementations resolve a single-assignment reply future; `set_reply` and
/// `fail` after the first resolution must be no-ops.
pub trait ClientSideRequest: Send + Sync {
    /// Reply type delivered back to the caller.
    type Reply: Send;
    /// Failure type used when the window fails as a whole.
    type Error: Clone + Send;

    /// Sequence number assigned at submission; never changes.
    fn seq_num(&self) -> u64;

    /// Mark this request as the window anchor, so its next build carries
    /// `is_first` on the wire. Idempotent.
    fn set_first_request(&self);

    /// True once the caller-visible future has resolved.
    fn is_done(&self) -> bool;

    /// Resolve with a reply.
    fn set_reply(&self, reply: Self::Reply);

    /// Resolve with a failure.
    fn fail(&self, error: Self::Error);
}

struct Slot<R: ClientSideRequest> {
    request: Arc<R>,
    /// Reply received from the service but not yet surfaced, because an
    /// earlier sequence number is still outstanding.
    staged_reply: Option<R::Reply>,
}

struct Inner<R: ClientSideRequest> {
    /// Outstanding requests by sequence number.
    requests: BTreeMap<u64, Slot<R>>,
    /// Next sequence number to assign.
    next_seq_num: u64,
    /// Sequence number of the current first request; `None` when empty.
    first_seq_num: Option<u64>,
    /// Highest sequence number already surfaced to a caller.
    last_delivered: Option<u64>,
}

/// Per-target sliding window preserving submission order.
pub struct SlidingWindowClient<R: ClientSideRequest> {
    name: String,
    inner: Mutex<Inner<R>>,
}

impl<R: ClientSideRequest> SlidingWindowClient<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                requests: BTreeMap::new(),
                next_seq_num: 1,
                first_seq_num: None,
                last_delivered: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assign the next sequence number, register the request built by
    /// `constructor`, and hand it to `send`.
    ///
    /// If the window was empty the new request becomes its first and is
    /// flagged before the send.
    pub fn submit_new_request(&self, constructor: impl FnOnce(u64) -> R, send: impl FnOnce(&Arc<R>)) -> Arc<R> {
        let request = {
            let mut inner = self.inner.lock().unwrap();
            let seq_num = inner.next_seq_num;
            inner.next_seq_num += 1;
            let request = Arc::new(constructor(seq_num));
            debug_assert_eq!(request.seq_num(), seq_num, "constructor must adopt the assigned seq");
            if inner.requests.is_empty() {
                inner.first_seq_num = Some(seq_num);
                request.set_first_request();
            }
            inner.requests.insert(seq_num, Slot {
                request: Arc::clone(&request),
                staged_reply: None,
            });
            trace!(window = %self.name, seq_num, first = ?inner.first_seq_num, "submitted new request");
            request
        };
        send(&request);
        request
    }

    /// Re-send an outstanding request without reassigning its sequence
    /// number. Outdated retries (completed, replaced, or already replied)
    /// are dropped.
    pub fn retry(&self, request: &Arc<R>, send: impl FnOnce(&Arc<R>)) {
        let seq_num = request.seq_num();
        {
            let inner = self.inner.lock().unwrap();
            let current = match inner.requests.get(&seq_num) {
                Some(slot) if Arc::ptr_eq(&slot.request, request) => slot,
                _ => {
                    trace!(window = %self.name, seq_num, "dropping retry for removed request");
                    return;
                }
            };
            if current.staged_reply.is_some() || request.is_done() {
                trace!(window = %self.name, seq_num, "dropping retry for replied request");
                return;
            }
            if inner.first_seq_num == Some(seq_num) {
                request.set_first_request();
            }
        }
        send(request);
    }

    /// Record the reply for `seq_num` and surface every now-contiguous reply
    /// to its caller in sequence order.
    ///
    /// When the head of the window completes and other requests remain, the
    /// new smallest outstanding request becomes the first: it is flagged and
    /// handed back to `send` so the server sees the anchor on the wire.
    pub fn receive_reply(&self, seq_num: u64, reply: R::Reply, send: impl FnOnce(&Arc<R>)) {
        let (delivered, new_first) = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            let Some(slot) = inner.requests.get_mut(&seq_num) else {
                trace!(window = %self.name, seq_num, "dropping reply for unknown or completed request");
                return;
            };
            if slot.staged_reply.is_some() {
                trace!(window = %self.name, seq_num, "dropping duplicate reply");
                return;
            }
            slot.staged_reply = Some(reply);

            let mut delivered = Vec::new();
            while let Some(entry) = inner.requests.first_entry() {
                if entry.get().staged_reply.is_none() {
                    break;
                }
                let (delivered_seq, slot) = entry.remove_entry();
                debug_assert!(
                    inner.last_delivered.is_none_or(|last| delivered_seq > last),
                    "reply delivery must be seq-ascending",
                );
                inner.last_delivered = Some(delivered_seq);
                delivered.push((slot.request, slot.staged_reply.expect("staged reply checked above")));
            }

            let new_first = if delivered.is_empty() {
                None
            } else {
                match inner.requests.first_key_value() {
                    Some((&head, slot)) if inner.first_seq_num != Some(head) => {
                        inner.first_seq_num = Some(head);
                        slot.request.set_first_request();
                        Some(Arc::clone(&slot.request))
                    }
                    Some(_) => None,
                    None => {
                        inner.first_seq_num = None;
                        None
                    }
                }
            };
            (delivered, new_first)
        };

        for (request, reply) in delivered {
            request.set_reply(reply);
        }
        if let Some(request) = new_first {
            debug!(window = %self.name, seq_num = request.seq_num(), "re-sending new first request");
            send(&request);
        }
    }

    /// Terminally fail the request at `seq_num` and, with it, every
    /// outstanding request in the window. The window resets and stays usable;
    /// the next submission anchors it afresh.
    pub fn fail(&self, seq_num: u64, error: R::Error) {
        let failed = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.requests.contains_key(&seq_num) {
                trace!(window = %self.name, seq_num, "dropping failure for unknown or completed request");
                return;
            }
            inner.first_seq_num = None;
            std::mem::take(&mut inner.requests)
        };

        warn!(window = %self.name, seq_num, outstanding = failed.len(), "failing all outstanding requests");
        for slot in failed.into_values() {
            slot.request.fail(error.clone());
        }
    }

    /// Re-anchor the window: the current smallest outstanding request is
    /// re-flagged so its next build carries `is_first` again. Used after a
    /// leader change. Idempotent.
    pub fn reset_first_seq_num(&self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.first_seq_num = match inner.requests.first_key_value() {
            Some((&seq_num, slot)) => {
                slot.request.set_first_request();
                Some(seq_num)
            }
            None => None,
        };
        debug!(window = %self.name, first = ?inner.first_seq_num, "window anchor reset");
    }

    /// Whether `seq_num` is the window's current first request.
    pub fn is_first(&self, seq_num: u64) -> bool {
        self.inner.lock().unwrap().first_seq_num == Some(seq_num)
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding() == 0
    }
}
