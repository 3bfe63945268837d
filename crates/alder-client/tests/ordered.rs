//! End-to-end scenarios for the ordered asynchronous client against the
//! deterministic in-memory Raft service.

use std::sync::Arc;
use std::time::Duration;

use alder_client::Message;
use alder_client::RaftClient;
use alder_client::RaftClientConfig;
use alder_client::RaftClientError;
use alder_client::RaftClientRpc;
use alder_client::RaftException;
use alder_client::RaftPeerId;
use alder_client::ReplicationLevel;
use alder_client::RequestType;
use alder_client::RetryLimited;
use alder_testing::init_test_tracing;
use alder_testing::DeterministicRaftService;
use alder_testing::Outcome;
use alder_testing::ReplyGate;

/// Long enough for spawned client tasks to settle, short enough to keep the
/// suite fast.
const SETTLE: Duration = Duration::from_millis(50);
const DEADLINE: Duration = Duration::from_secs(2);

fn client_for(service: &Arc<DeterministicRaftService>) -> RaftClient {
    client_with_config(service, RaftClientConfig::default())
}

fn client_with_config(service: &Arc<DeterministicRaftService>, config: RaftClientConfig) -> RaftClient {
    init_test_tracing();
    RaftClient::builder()
        .peers(vec![RaftPeerId::from("s1"), RaftPeerId::from("s2"), RaftPeerId::from("s3")])
        .transport(Arc::clone(service) as Arc<dyn RaftClientRpc>)
        .retry_policy(Arc::new(RetryLimited::new(5, Duration::from_millis(5))))
        .config(config)
        .build()
        .unwrap()
}

async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn single_write_completes_with_first_flag_on_the_wire() {
    let service = DeterministicRaftService::new();
    let client = client_for(&service);

    let pending = client.send("set x = 1").await.unwrap();
    let reply = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap();

    assert!(reply.is_success());
    assert_eq!(reply.message, Some(Message::from("set x = 1")));

    let entries = service.wire_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq_num, 1);
    assert!(entries[0].is_first);

    settle().await;
    assert_eq!(client.outstanding_requests(), 0);
}

#[tokio::test]
async fn watch_requests_carry_no_message() {
    let service = DeterministicRaftService::new();
    let client = client_for(&service);

    let pending = client.watch(9, ReplicationLevel::AllCommitted).await.unwrap();
    let reply = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap();
    assert!(reply.is_success());

    let sent = service.sent_requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.is_none());
    assert_eq!(sent[0].request_type, RequestType::Watch {
        index: 9,
        replication: ReplicationLevel::AllCommitted,
    });
}

// ============================================================================
// In-order delivery
// ============================================================================

#[tokio::test]
async fn reordered_replies_surface_in_submission_order() {
    let service = DeterministicRaftService::new();
    let gate_one = ReplyGate::new();
    let gate_two = ReplyGate::new();
    service.enqueue(1, Outcome::Gated(Arc::clone(&gate_one)));
    service.enqueue(2, Outcome::Gated(Arc::clone(&gate_two)));
    let client = client_for(&service);

    let first = client.send("a").await.unwrap();
    let second = client.send("b").await.unwrap();
    settle().await;

    // The service completes seq 2 first; its reply must wait for seq 1.
    gate_two.release(Outcome::Success);
    settle().await;
    assert!(!first.is_done());
    assert!(!second.is_done());

    gate_one.release(Outcome::Success);
    let reply_one = tokio::time::timeout(DEADLINE, first.recv()).await.unwrap().unwrap();
    let reply_two = tokio::time::timeout(DEADLINE, second.recv()).await.unwrap().unwrap();

    // Each caller gets its own reply, not a swapped one.
    assert_eq!(reply_one.message, Some(Message::from("a")));
    assert_eq!(reply_two.message, Some(Message::from("b")));
    assert_eq!(client.outstanding_requests(), 0);
}

#[tokio::test]
async fn head_completion_restamps_and_resends_the_new_first() {
    let service = DeterministicRaftService::new();
    let gate_one = ReplyGate::new();
    let gate_two = ReplyGate::new();
    service.enqueue(1, Outcome::Gated(Arc::clone(&gate_one)));
    service.enqueue(2, Outcome::Gated(Arc::clone(&gate_two)));
    let client = client_for(&service);

    let first = client.send("a").await.unwrap();
    let second = client.send("b").await.unwrap();
    settle().await;

    // Seq 1 completes while seq 2 is still waiting: the window promotes
    // seq 2 to first and re-sends it with the anchor flag set.
    gate_one.release(Outcome::Success);
    let reply_one = tokio::time::timeout(DEADLINE, first.recv()).await.unwrap().unwrap();
    assert!(reply_one.is_success());
    let reply_two = tokio::time::timeout(DEADLINE, second.recv()).await.unwrap().unwrap();
    assert!(reply_two.is_success());

    let seq_two_sends = service.requests_for_seq(2);
    assert_eq!(seq_two_sends.len(), 2, "seq 2 should be re-sent once promoted");
    assert!(!seq_two_sends[0].sliding_window_entry.is_first);
    assert!(seq_two_sends[1].sliding_window_entry.is_first);

    // The original held attempt resolves late and is dropped.
    gate_two.release(Outcome::Success);
    settle().await;
    assert_eq!(client.outstanding_requests(), 0);
}

// ============================================================================
// Leader changes
// ============================================================================

#[tokio::test]
async fn not_leader_failure_redirects_and_preserves_order() {
    let service = DeterministicRaftService::new();
    let gate_one = ReplyGate::new();
    service.enqueue(1, Outcome::Gated(Arc::clone(&gate_one)));
    let client = client_for(&service);

    let first = client.send("a").await.unwrap();
    let second = client.send("b").await.unwrap();
    let third = client.send("c").await.unwrap();
    settle().await;

    // Seqs 2 and 3 already have replies staged, but seq 1 is outstanding.
    assert!(!second.is_done());
    assert!(!third.is_done());

    gate_one.release(Outcome::Fail(RaftClientError::NotLeader {
        server_id: RaftPeerId::from("s1"),
        suggested_leader: Some(RaftPeerId::from("s2")),
    }));

    let reply_one = tokio::time::timeout(DEADLINE, first.recv()).await.unwrap().unwrap();
    let reply_two = tokio::time::timeout(DEADLINE, second.recv()).await.unwrap().unwrap();
    let reply_three = tokio::time::timeout(DEADLINE, third.recv()).await.unwrap().unwrap();
    assert!(reply_one.is_success());
    assert!(reply_two.is_success());
    assert!(reply_three.is_success());

    // The client adopted the suggested leader.
    assert_eq!(client.leader(), RaftPeerId::from("s2"));

    // Seq 1 went out twice: once to the old leader, once to the new one,
    // anchored both times.
    let seq_one_sends = service.requests_for_seq(1);
    assert_eq!(seq_one_sends.len(), 2);
    assert_eq!(seq_one_sends[0].server_id, RaftPeerId::from("s1"));
    assert_eq!(seq_one_sends[1].server_id, RaftPeerId::from("s2"));
    assert!(seq_one_sends[0].sliding_window_entry.is_first);
    assert!(seq_one_sends[1].sliding_window_entry.is_first);
}

#[tokio::test]
async fn not_leader_reply_embedded_in_payload_is_consumed_and_retried() {
    let service = DeterministicRaftService::new();
    service.enqueue(1, Outcome::Exception(RaftException::NotLeader {
        suggested_leader: Some(RaftPeerId::from("s3")),
    }));
    let client = client_for(&service);

    let pending = client.send("a").await.unwrap();
    let reply = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap();

    assert!(reply.is_success());
    assert_eq!(client.leader(), RaftPeerId::from("s3"));
    assert_eq!(service.requests_for_seq(1).len(), 2);
}

// ============================================================================
// Terminal failures
// ============================================================================

#[tokio::test]
async fn group_mismatch_fails_every_outstanding_request() {
    let service = DeterministicRaftService::new();
    let gate_one = ReplyGate::new();
    let gate_two = ReplyGate::new();
    service.enqueue(1, Outcome::Gated(Arc::clone(&gate_one)));
    service.enqueue(2, Outcome::Gated(Arc::clone(&gate_two)));
    let client = client_for(&service);

    let first = client.send("a").await.unwrap();
    let second = client.send("b").await.unwrap();
    settle().await;

    gate_one.release(Outcome::Fail(RaftClientError::GroupMismatch {
        server_id: RaftPeerId::from("s1"),
        reason: "wrong group".to_string(),
    }));

    let error_one = tokio::time::timeout(DEADLINE, first.recv()).await.unwrap().unwrap_err();
    let error_two = tokio::time::timeout(DEADLINE, second.recv()).await.unwrap().unwrap_err();

    match &error_one {
        RaftClientError::GroupMismatch { reason, .. } => assert_eq!(reason, "wrong group"),
        other => panic!("unexpected error: {:?}", other),
    }
    // Fate-sharing: the untouched request fails with the same cause.
    assert_eq!(error_one, error_two);
    assert_eq!(client.outstanding_requests(), 0);

    // The late reply for seq 2 is dropped, and the window stays usable.
    gate_two.release(Outcome::Success);
    let pending = client.send("after failure").await.unwrap();
    let reply = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap();
    assert!(reply.is_success());
    let last = service.sent_requests().pop().unwrap();
    assert!(last.sliding_window_entry.is_first, "fresh window must re-anchor");
}

#[tokio::test]
async fn exhausted_retries_fail_the_window_with_the_last_cause() {
    let service = DeterministicRaftService::new();
    for _ in 0..3 {
        service.enqueue(1, Outcome::Fail(RaftClientError::Io {
            server_id: RaftPeerId::from("s1"),
            reason: "connection refused".to_string(),
        }));
    }
    let client = client_with_config(&service, RaftClientConfig::default());

    // Tighten the policy to two attempts.
    let service_two = DeterministicRaftService::new();
    for _ in 0..3 {
        service_two.enqueue(1, Outcome::Fail(RaftClientError::Io {
            server_id: RaftPeerId::from("s1"),
            reason: "connection refused".to_string(),
        }));
    }
    let strict = RaftClient::builder()
        .peers(vec![RaftPeerId::from("s1"), RaftPeerId::from("s2")])
        .transport(Arc::clone(&service_two) as Arc<dyn RaftClientRpc>)
        .retry_policy(Arc::new(RetryLimited::new(2, Duration::from_millis(2))))
        .build()
        .unwrap();

    let pending = strict.send("a").await.unwrap();
    let error = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap_err();

    match error {
        RaftClientError::RetryFailure { attempts, cause } => {
            assert_eq!(attempts, 2);
            match cause.as_deref() {
                Some(RaftClientError::Io { reason, .. }) => assert_eq!(reason, "connection refused"),
                other => panic!("unexpected cause: {:?}", other),
            }
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(service_two.request_count(), 2);

    // Keep the generous client exercised too: its five attempts outlast the
    // three scripted failures.
    let pending = client.send("b").await.unwrap();
    assert!(tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().is_ok());
}

#[tokio::test]
async fn embedded_state_machine_exception_surfaces_to_the_caller() {
    let service = DeterministicRaftService::new();
    service.enqueue(1, Outcome::Exception(RaftException::StateMachine {
        message: "apply failed".to_string(),
    }));
    let client = client_for(&service);

    let pending = client.send("a").await.unwrap();
    let error = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap_err();

    match error {
        RaftClientError::Raft {
            source: RaftException::StateMachine { message },
        } => assert_eq!(message, "apply failed"),
        other => panic!("unexpected error: {:?}", other),
    }
    // The reply was delivered (not retried): one attempt only.
    assert_eq!(service.request_count(), 1);
    assert_eq!(client.outstanding_requests(), 0);
}

// ============================================================================
// Retry signals
// ============================================================================

#[tokio::test]
async fn null_reply_retries_without_reassigning_seq() {
    let service = DeterministicRaftService::new();
    service.enqueue(1, Outcome::NoReply);
    let client = client_for(&service);

    let pending = client.send("a").await.unwrap();
    let reply = tokio::time::timeout(DEADLINE, pending.recv()).await.unwrap().unwrap();

    assert!(reply.is_success());
    let sends = service.requests_for_seq(1);
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].call_id, sends[1].call_id, "retries keep the call id");
    assert_eq!(service.request_count(), 2, "no other seq was used");
}

// ============================================================================
// Admission gate
// ============================================================================

#[tokio::test]
async fn admission_gate_blocks_the_third_sender_at_capacity_two() {
    let service = DeterministicRaftService::new();
    let gate_one = ReplyGate::new();
    let gate_two = ReplyGate::new();
    service.enqueue(1, Outcome::Gated(Arc::clone(&gate_one)));
    service.enqueue(2, Outcome::Gated(Arc::clone(&gate_two)));
    let client = Arc::new(client_with_config(&service, RaftClientConfig {
        max_outstanding_requests: 2,
    }));

    let first = client.send("a").await.unwrap();
    let _second = client.send("b").await.unwrap();

    let blocked = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let pending = client.send("c").await.unwrap();
            pending.recv().await
        })
    };
    settle().await;
    assert!(!blocked.is_finished(), "third send must block on admission");

    // Completing one outstanding request frees a permit.
    gate_one.release(Outcome::Success);
    let reply = tokio::time::timeout(DEADLINE, first.recv()).await.unwrap().unwrap();
    assert!(reply.is_success());

    gate_two.release(Outcome::Success);
    let reply = tokio::time::timeout(DEADLINE, blocked).await.unwrap().unwrap().unwrap();
    assert!(reply.is_success());
}

#[tokio::test]
async fn close_interrupts_senders_blocked_on_admission() {
    let service = DeterministicRaftService::new();
    let gate = ReplyGate::new();
    service.enqueue(1, Outcome::Gated(Arc::clone(&gate)));
    let client = Arc::new(client_with_config(&service, RaftClientConfig {
        max_outstanding_requests: 1,
    }));

    let _first = client.send("a").await.unwrap();
    let blocked = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.send("b").await })
    };
    settle().await;
    assert!(!blocked.is_finished());

    client.close();
    let result = tokio::time::timeout(DEADLINE, blocked).await.unwrap().unwrap();
    match result {
        Err(RaftClientError::Interrupted { operation }) => {
            assert!(operation.contains("admission"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // The admitted request still runs to completion.
    gate.release(Outcome::Success);
    settle().await;
    assert_eq!(client.outstanding_requests(), 0);
}

// ============================================================================
// Window separation
// ============================================================================

#[tokio::test]
async fn stale_reads_get_their_own_window_per_server() {
    let service = DeterministicRaftService::new();
    let client = client_for(&service);

    let write = client.send("w").await.unwrap();
    let stale = client.send_stale_read("r", 4, RaftPeerId::from("sB")).await.unwrap();

    let write_reply = tokio::time::timeout(DEADLINE, write.recv()).await.unwrap().unwrap();
    let stale_reply = tokio::time::timeout(DEADLINE, stale.recv()).await.unwrap().unwrap();
    assert!(write_reply.is_success());
    assert!(stale_reply.is_success());

    let sent = service.sent_requests();
    assert_eq!(sent.len(), 2);
    // Both windows assigned seq 1 independently, and both anchored it.
    for request in &sent {
        assert_eq!(request.sliding_window_entry.seq_num, 1);
        assert!(request.sliding_window_entry.is_first);
    }
    let stale_request = sent.iter().find(|request| request.request_type.is_stale_read()).unwrap();
    assert_eq!(stale_request.server_id, RaftPeerId::from("sB"));
    assert_eq!(stale_request.request_type, RequestType::StaleRead { min_index: 4 });
}
