//! Integration tests for `Connection::process`.
//!
//! Each test plays the provider over an in-memory `tokio::io::duplex` pipe:
//! the server half runs in a background task, the client half writes encoded
//! notifications and reads back 6-byte replies.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use apns_mock::error::DecodeError;
use apns_mock::reply::REPLY_LEN;
use apns_mock::simulator::{BoundsCheckPolicy, ScriptedPolicy};
use apns_mock::{
    Acknowledgement, CloseReason, ConnError, Connection, ConnectionState, ConnectionSummary,
    FaultConfig, Format, Notification, PolicyError, ProcessConfig, ProtocolError, ReplyPolicy,
    Response,
};

const GUARD: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn frame(id: u32) -> Vec<u8> {
    Notification::new(Format::Frame, vec![0x11; 32], br#"{"aps":{}}"#.to_vec())
        .with_identifier(id)
        .encode()
        .expect("encode notification")
}

fn spawn_processor(
    server: DuplexStream,
    policy: Box<dyn ReplyPolicy>,
    config: ProcessConfig,
) -> JoinHandle<ConnectionSummary> {
    tokio::spawn(async move {
        Connection::new(server)
            .with_label("test")
            .process(policy, &config, StdRng::seed_from_u64(1))
            .await
    })
}

/// Read replies until the server closes its side.
async fn read_all_replies(client: &mut DuplexStream) -> Vec<Acknowledgement> {
    let mut bytes = Vec::new();
    tokio::time::timeout(GUARD, client.read_to_end(&mut bytes))
        .await
        .expect("server never closed")
        .expect("read replies");
    assert_eq!(bytes.len() % REPLY_LEN, 0, "partial reply on the wire");
    bytes
        .chunks(REPLY_LEN)
        .map(|c| Acknowledgement::decode(c.try_into().unwrap()).expect("reply tag"))
        .collect()
}

async fn finish(task: JoinHandle<ConnectionSummary>) -> ConnectionSummary {
    tokio::time::timeout(GUARD, task)
        .await
        .expect("processor hung")
        .expect("processor panicked")
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// With min == max the delay is fixed and replies keep submission order.
#[tokio::test]
async fn fixed_delay_preserves_submission_order() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let config = ProcessConfig::new().with_fixed_delay(Duration::from_millis(2));
    let task = spawn_processor(server, Box::new(BoundsCheckPolicy::default()), config);

    for id in 0..50 {
        client.write_all(&frame(id)).await.unwrap();
    }
    client.shutdown().await.unwrap();

    let replies = read_all_replies(&mut client).await;
    let ids: Vec<u32> = replies.iter().map(|a| a.identifier).collect();
    assert_eq!(ids, (0..50).collect::<Vec<_>>());
    assert!(replies.iter().all(|a| a.status == 0));

    let summary = finish(task).await;
    assert!(matches!(summary.close, CloseReason::PeerClosed));
    assert_eq!(summary.received, 50);
    assert_eq!(summary.replied, 50);
    assert_eq!(summary.discarded, 0);
}

/// Independent delays may reorder replies; only the set of ids is checked.
#[tokio::test]
async fn random_delays_answer_every_notification() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let config = ProcessConfig::new()
        .with_delay(Duration::ZERO, Duration::from_millis(20))
        .with_seed(3);
    let task = spawn_processor(server, Box::new(BoundsCheckPolicy::default()), config);

    for id in 100..130 {
        client.write_all(&frame(id)).await.unwrap();
    }
    client.shutdown().await.unwrap();

    let mut ids: Vec<u32> = read_all_replies(&mut client)
        .await
        .iter()
        .map(|a| a.identifier)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (100..130).collect::<Vec<_>>());

    let summary = finish(task).await;
    assert_eq!(summary.replied, 30);
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_closes_without_later_replies() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = spawn_processor(
        server,
        Box::new(BoundsCheckPolicy::default()),
        ProcessConfig::new(),
    );

    client.write_all(&frame(1)).await.unwrap();
    client.write_all(&frame(2)).await.unwrap();
    client.write_all(&[9u8]).await.unwrap();
    client.write_all(&frame(3)).await.unwrap();

    let replies = read_all_replies(&mut client).await;
    assert!(replies.len() <= 2);
    assert!(replies.iter().all(|a| a.identifier == 1 || a.identifier == 2));

    let summary = finish(task).await;
    match summary.close {
        CloseReason::Failed(ConnError::Decode(DecodeError::Protocol(e))) => {
            assert_eq!(e, ProtocolError::UnknownFormat(9))
        }
        other => panic!("unexpected close {other:?}"),
    }
    assert_eq!(summary.received, 2);
}

/// Replies still waiting on their delay are discarded, not flushed, when
/// the stream turns out to be malformed.
#[tokio::test]
async fn malformed_frame_discards_pending_replies() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let config = ProcessConfig::new().with_fixed_delay(Duration::from_millis(300));
    let task = spawn_processor(server, Box::new(BoundsCheckPolicy::default()), config);

    let mut bytes = frame(1);
    bytes.extend(frame(2));
    // Frame item overruns the declared frame length.
    bytes.extend([2u8, 0, 0, 0, 3, 1, 0, 32]);
    client.write_all(&bytes).await.unwrap();

    assert!(read_all_replies(&mut client).await.is_empty());

    let summary = finish(task).await;
    assert!(matches!(summary.close, CloseReason::Failed(_)));
    assert_eq!(summary.replied, 0);
    assert_eq!(summary.discarded, 2);
}

// ---------------------------------------------------------------------------
// Termination and peer loss
// ---------------------------------------------------------------------------

#[tokio::test]
async fn terminate_status_is_the_last_reply() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = spawn_processor(
        server,
        Box::new(ScriptedPolicy::new(vec![0, 8, 255])),
        ProcessConfig::new(),
    );

    for id in 1..=5 {
        client.write_all(&frame(id)).await.unwrap();
    }

    // The client never closes; the server must.
    let replies = read_all_replies(&mut client).await;
    let got: Vec<(u32, u8)> = replies.iter().map(|a| (a.identifier, a.status)).collect();
    assert_eq!(got, vec![(1, 0), (2, 8), (3, 255)]);

    let summary = finish(task).await;
    assert!(matches!(summary.close, CloseReason::Terminated));
    assert_eq!(summary.received, 3);
}

#[tokio::test]
async fn vanished_peer_does_not_hang_delivery() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let config = ProcessConfig::new().with_fixed_delay(Duration::from_millis(20));
    let task = spawn_processor(server, Box::new(BoundsCheckPolicy::default()), config);

    for id in 0..10 {
        client.write_all(&frame(id)).await.unwrap();
    }
    drop(client);

    let summary = finish(task).await;
    assert!(matches!(summary.close, CloseReason::PeerClosed));
    assert_eq!(summary.replied, 0);
}

// ---------------------------------------------------------------------------
// Policy failures and lifecycle
// ---------------------------------------------------------------------------

struct FailingPolicy;

impl ReplyPolicy for FailingPolicy {
    fn respond(&mut self, _: &Notification) -> Result<Response, PolicyError> {
        Err(PolicyError("backend unavailable".into()))
    }
}

#[tokio::test]
async fn policy_error_is_fatal() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = spawn_processor(server, Box::new(FailingPolicy), ProcessConfig::new());

    client.write_all(&frame(1)).await.unwrap();

    assert!(read_all_replies(&mut client).await.is_empty());
    let summary = finish(task).await;
    assert!(matches!(
        summary.close,
        CloseReason::Failed(ConnError::Policy(_))
    ));
}

/// Acknowledges even identifiers and silently withholds odd ones.
struct EvenOnlyPolicy;

impl ReplyPolicy for EvenOnlyPolicy {
    fn respond(&mut self, n: &Notification) -> Result<Response, PolicyError> {
        let id = n.identifier.unwrap_or(0);
        let ack = Acknowledgement::new(id, 0);
        Ok(if id % 2 == 0 {
            Response::reply(ack)
        } else {
            Response::withhold(ack)
        })
    }
}

#[tokio::test]
async fn policy_can_withhold_replies() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let task = spawn_processor(server, Box::new(EvenOnlyPolicy), ProcessConfig::new());

    for id in 0..6 {
        client.write_all(&frame(id)).await.unwrap();
    }
    client.shutdown().await.unwrap();

    let ids: Vec<u32> = read_all_replies(&mut client)
        .await
        .iter()
        .map(|a| a.identifier)
        .collect();
    assert_eq!(ids, vec![0, 2, 4]);

    let summary = finish(task).await;
    assert_eq!(summary.received, 6);
    assert_eq!(summary.withheld, 3);
    assert_eq!(summary.replied, 3);
}

/// Rates outside [0, 1] reach `process` unchecked when the caller skips
/// `ProcessConfig::validate`; they saturate rather than kill the task.
#[tokio::test]
async fn unvalidated_fault_rates_do_not_panic() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let config = ProcessConfig::new().with_faults(FaultConfig {
        error_rate: 1.5,
        withhold_rate: f64::NAN,
        ..Default::default()
    });
    let task = spawn_processor(server, Box::new(BoundsCheckPolicy::default()), config);

    client.write_all(&frame(1)).await.unwrap();
    client.shutdown().await.unwrap();

    let replies = read_all_replies(&mut client).await;
    assert_eq!(replies.len(), 1);
    assert!((1..=8).contains(&replies[0].status));

    let summary = finish(task).await;
    assert!(matches!(summary.close, CloseReason::PeerClosed));
}

#[tokio::test]
async fn state_reaches_closed_after_processing() {
    let (client, server) = tokio::io::duplex(1024);
    let conn = Connection::new(server);
    let states = conn.subscribe();
    assert_eq!(conn.state(), ConnectionState::Idle);
    assert!(!conn.state().is_terminal());

    drop(client);
    let summary = tokio::time::timeout(
        GUARD,
        conn.process(
            Box::new(BoundsCheckPolicy::default()),
            &ProcessConfig::new(),
            StdRng::seed_from_u64(0),
        ),
    )
    .await
    .expect("processor hung");

    assert!(matches!(summary.close, CloseReason::PeerClosed));
    assert_eq!(*states.borrow(), ConnectionState::Closed);
    assert!(states.borrow().is_terminal());
}
