use ferrous_backend_application::use_cases::LookupQueryUseCase;
use ferrous_backend_domain::config::ResolverFailurePolicy;
use ferrous_backend_domain::{AbiVersion, BackendError, Record};
use ferrous_backend_infrastructure::backend::{
    ConnectionHandler, HandlerRegistry, HandlerState, SessionOptions, SessionSummary,
};
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

mod helpers;
use helpers::{
    example_record, MockResolver, TestPeer, EXAMPLE_DATA_LINE, EXAMPLE_QUERY_V1, TEST_TIMEOUT,
};

struct Harness {
    handler: Arc<ConnectionHandler>,
    registry: Arc<HandlerRegistry>,
    task: JoinHandle<Result<SessionSummary, BackendError>>,
    peer: TestPeer,
}

impl Harness {
    fn start(lookup: LookupQueryUseCase, options: SessionOptions) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let handler = Arc::new(ConnectionHandler::new(
            registry.next_id(),
            options,
            Arc::new(lookup),
            registry.clone(),
        ));
        registry.register(handler.clone());

        let (server_side, client_side) = UnixStream::pair().unwrap();
        let task = tokio::spawn({
            let handler = handler.clone();
            async move { handler.run(server_side).await }
        });

        Self {
            handler,
            registry,
            task,
            peer: TestPeer::new(client_side),
        }
    }

    fn with_resolver(resolver: MockResolver) -> Self {
        Self::start(
            LookupQueryUseCase::with_resolver(Arc::new(resolver)),
            SessionOptions::default(),
        )
    }

    async fn finish(self) -> (Result<SessionSummary, BackendError>, TestPeer, Arc<ConnectionHandler>, Arc<HandlerRegistry>) {
        let result = timeout(TEST_TIMEOUT, self.task)
            .await
            .expect("handler did not finish")
            .expect("handler task panicked");
        (result, self.peer, self.handler, self.registry)
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_acknowledges_every_version() {
    for version in 1..=3u8 {
        let mut harness = Harness::with_resolver(MockResolver::new());

        let ack = harness.peer.handshake(version).await;
        assert_eq!(ack.as_deref(), Some("HELO\tdefault backend"));
        assert_eq!(harness.handler.state(), HandlerState::Ready);

        harness.peer.finish().await;
        let (result, _, _, _) = harness.finish().await;
        let summary = result.unwrap();
        assert_eq!(summary.version, AbiVersion::from_u8(version));
        assert!(!summary.stopped);
    }
}

#[tokio::test]
async fn test_handshake_uses_configured_banner() {
    let options = SessionOptions {
        banner: Arc::from("lab backend"),
        resolver_failure: ResolverFailurePolicy::Close,
    };
    let mut harness = Harness::start(
        LookupQueryUseCase::with_resolver(Arc::new(MockResolver::new())),
        options,
    );

    assert_eq!(harness.peer.handshake(2).await.as_deref(), Some("HELO\tlab backend"));
    harness.peer.finish().await;
    assert!(harness.finish().await.0.is_ok());
}

#[tokio::test]
async fn test_bad_handshake_sends_fail_and_ends_session() {
    let resolver = MockResolver::with_records(vec![example_record()]);
    let mut harness = Harness::with_resolver(resolver.clone());

    harness.peer.send("EHLO\t1").await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("FAIL"));
    assert_eq!(harness.peer.recv().await, None);

    let (result, _, handler, registry) = harness.finish().await;
    assert!(matches!(result, Err(BackendError::Handshake { .. })));
    assert_eq!(resolver.call_count(), 0);
    assert_eq!(handler.state(), HandlerState::Closed);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_eof_before_handshake_is_not_an_error() {
    let mut harness = Harness::with_resolver(MockResolver::new());

    harness.peer.finish().await;

    let (result, mut peer, handler, registry) = harness.finish().await;
    let summary = result.unwrap();
    assert_eq!(summary.version, None);
    assert_eq!(peer.recv().await, None);
    assert_eq!(handler.state(), HandlerState::Closed);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_read_failure_before_handshake_sends_fail() {
    let mut harness = Harness::with_resolver(MockResolver::new());

    harness.peer.send_raw(b"\xff\xfe\xfd\n").await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("FAIL"));

    let (result, _, _, _) = harness.finish().await;
    assert!(matches!(result, Err(BackendError::Io(_))));
}

// ============================================================================
// Query loop
// ============================================================================

#[tokio::test]
async fn test_single_record_answer() {
    let resolver = MockResolver::with_records(vec![example_record()]);
    let mut harness = Harness::with_resolver(resolver.clone());

    harness.peer.handshake(1).await;
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some(EXAMPLE_DATA_LINE));
    assert_eq!(harness.peer.recv().await.as_deref(), Some("END"));
    harness.peer.finish().await;

    let (result, mut peer, handler, registry) = harness.finish().await;
    assert_eq!(peer.recv().await, None);
    assert_eq!(result.unwrap().queries_answered, 1);
    assert_eq!(handler.state(), HandlerState::Closed);
    assert!(registry.is_empty());

    let seen = resolver.seen_queries();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name(), "www.example.com");
    assert_eq!(seen[0].remote_ip(), "8.8.8.8");
}

#[tokio::test]
async fn test_empty_answer_is_just_end() {
    let mut harness = Harness::with_resolver(MockResolver::new());

    harness.peer.handshake(1).await;
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("END"));
    harness.peer.finish().await;

    let (result, mut peer, _, _) = harness.finish().await;
    assert_eq!(peer.recv().await, None);
    assert_eq!(result.unwrap().queries_answered, 1);
}

#[tokio::test]
async fn test_records_keep_resolver_order_and_duplicates() {
    let records = vec![
        Record::new("example.com", "IN", "A", 60, -1, "10.0.0.2"),
        Record::new("example.com", "IN", "A", 60, -1, "10.0.0.1"),
        Record::new("example.com", "IN", "A", 60, -1, "10.0.0.2"),
    ];
    let mut harness = Harness::with_resolver(MockResolver::with_records(records));

    harness.peer.handshake(1).await;
    harness.peer.send(EXAMPLE_QUERY_V1).await;

    for content in ["10.0.0.2", "10.0.0.1", "10.0.0.2"] {
        let expected = format!("DATA\texample.com\tIN\tA\t60\t-1\t{}", content);
        assert_eq!(harness.peer.recv().await, Some(expected));
    }
    assert_eq!(harness.peer.recv().await.as_deref(), Some("END"));
    harness.peer.finish().await;
    assert!(harness.finish().await.0.is_ok());
}

#[tokio::test]
async fn test_queries_answered_in_arrival_order() {
    let resolver = MockResolver::with_records(vec![example_record()]);
    let mut harness = Harness::with_resolver(resolver.clone());

    harness.peer.handshake(1).await;
    for name in ["a.example.com", "b.example.com", "c.example.com"] {
        harness
            .peer
            .send(&format!("Q\t{}\tA\tIN\t-1\t127.0.0.1", name))
            .await;
        assert_eq!(harness.peer.recv().await.as_deref(), Some(EXAMPLE_DATA_LINE));
        assert_eq!(harness.peer.recv().await.as_deref(), Some("END"));
    }
    harness.peer.finish().await;

    let (result, _, _, _) = harness.finish().await;
    assert_eq!(result.unwrap().queries_answered, 3);

    let names: Vec<String> = resolver
        .seen_queries()
        .iter()
        .map(|q| q.name().to_string())
        .collect();
    assert_eq!(names, vec!["a.example.com", "b.example.com", "c.example.com"]);
}

#[tokio::test]
async fn test_v3_query_passes_extended_fields() {
    let resolver = MockResolver::new();
    let mut harness = Harness::with_resolver(resolver.clone());

    harness.peer.handshake(3).await;
    harness
        .peer
        .send("Q\texample.com\tA\tIN\t5\t10.1.1.1\t10.0.0.53\t10.1.1.0/24")
        .await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("END"));
    harness.peer.finish().await;
    assert!(harness.finish().await.0.is_ok());

    let query = &resolver.seen_queries()[0];
    assert_eq!(query.abi_version(), AbiVersion::V3);
    assert_eq!(query.id(), 5);
    assert_eq!(query.local_ip().unwrap(), "10.0.0.53");
    assert_eq!(query.edns_subnet().unwrap(), "10.1.1.0/24");
}

#[tokio::test]
async fn test_empty_line_ends_session() {
    let resolver = MockResolver::new();
    let mut harness = Harness::with_resolver(resolver.clone());

    harness.peer.handshake(1).await;
    harness.peer.send("").await;

    let (result, mut peer, _, _) = harness.finish().await;
    assert!(result.is_ok());
    assert_eq!(peer.recv().await, None);
    assert_eq!(resolver.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_query_sends_fail_and_ends_session() {
    let resolver = MockResolver::with_records(vec![example_record()]);
    let mut harness = Harness::with_resolver(resolver.clone());

    harness.peer.handshake(2).await;
    // Version 2 expects seven fields.
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("FAIL"));
    assert_eq!(harness.peer.recv().await, None);

    let (result, _, handler, registry) = harness.finish().await;
    match result {
        Err(BackendError::QueryParse { version, .. }) => assert_eq!(version, AbiVersion::V2),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(resolver.call_count(), 0);
    assert_eq!(handler.state(), HandlerState::Closed);
    assert!(registry.is_empty());
}

// ============================================================================
// Resolver failures
// ============================================================================

#[tokio::test]
async fn test_resolver_failure_closes_session_by_default() {
    let mut harness = Harness::with_resolver(MockResolver::failing());

    harness.peer.handshake(1).await;
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("FAIL"));
    assert_eq!(harness.peer.recv().await, None);

    let (result, _, _, _) = harness.finish().await;
    assert!(matches!(result, Err(BackendError::Resolver(_))));
}

#[tokio::test]
async fn test_resolver_failure_can_continue_session() {
    let resolver = MockResolver::with_records(vec![example_record()]);
    resolver.set_should_fail(true);
    let options = SessionOptions {
        resolver_failure: ResolverFailurePolicy::Continue,
        ..SessionOptions::default()
    };
    let mut harness = Harness::start(
        LookupQueryUseCase::with_resolver(Arc::new(resolver.clone())),
        options,
    );

    harness.peer.handshake(1).await;
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some("FAIL"));

    resolver.set_should_fail(false);
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await.as_deref(), Some(EXAMPLE_DATA_LINE));
    assert_eq!(harness.peer.recv().await.as_deref(), Some("END"));
    harness.peer.finish().await;

    let summary = harness.finish().await.0.unwrap();
    assert_eq!(summary.queries_answered, 1);
    assert_eq!(summary.failed_lookups, 1);
}

#[tokio::test]
async fn test_missing_resolver_closes_session_without_fail() {
    let mut harness = Harness::start(LookupQueryUseCase::new(), SessionOptions::default());

    harness.peer.handshake(1).await;
    harness.peer.send(EXAMPLE_QUERY_V1).await;
    assert_eq!(harness.peer.recv().await, None);

    let (result, _, _, registry) = harness.finish().await;
    assert!(matches!(result, Err(BackendError::Configuration(_))));
    assert!(registry.is_empty());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_stop_during_read_is_a_normal_close() {
    let mut harness = Harness::with_resolver(MockResolver::new());

    harness.peer.handshake(1).await;
    harness.handler.stop();

    let (result, mut peer, handler, registry) = harness.finish().await;
    let summary = result.unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.version, Some(AbiVersion::V1));
    assert!(handler.is_shutting_down());
    assert_eq!(handler.state(), HandlerState::Closed);
    assert!(registry.is_empty());
    assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn test_stop_while_awaiting_handshake() {
    let harness = Harness::with_resolver(MockResolver::new());

    harness.handler.stop();

    let (result, _, handler, _) = harness.finish().await;
    let summary = result.unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.version, None);
    assert_eq!(handler.state(), HandlerState::Closed);
}

#[tokio::test]
async fn test_stop_after_close_is_harmless() {
    let mut harness = Harness::with_resolver(MockResolver::new());

    harness.peer.finish().await;
    let (result, _, handler, registry) = harness.finish().await;
    assert!(result.is_ok());

    handler.stop();
    handler.stop();
    assert_eq!(handler.state(), HandlerState::Closed);
    assert!(!registry.unregister(handler.id()));
}
