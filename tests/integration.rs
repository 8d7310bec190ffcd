//! End-to-end tests: a client speaking the wire protocol to a server over an
//! in-memory duplex stream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use nodewire::codec::MsgPackCodec;
use nodewire::node::{
    node_registry, ErrorKind, FetchTaggedRequest, FetchTaggedResult, MemoryNode, NodeError,
    NodeHealthResult, Series, Tag,
};
use nodewire::protocol::{build_frame, flags, Frame, FrameBuffer, ABORT_METHOD_ID};
use nodewire::rpc::{
    Args, CallContext, CallHeaders, HandlerError, Method, MethodRegistry, ResponseStream,
    ResultEnvelope, SystemError, SystemErrorCode,
};
use nodewire::NodeServer;

const FETCH_TAGGED: u16 = 1;
const HEALTH: u16 = 2;
const SEC: i64 = 1_000_000_000;

struct TestClient {
    io: DuplexStream,
    buffer: FrameBuffer,
    ready: VecDeque<Frame>,
}

impl TestClient {
    fn new(io: DuplexStream) -> Self {
        Self {
            io,
            buffer: FrameBuffer::new(),
            ready: VecDeque::new(),
        }
    }

    async fn call<T: Serialize>(&mut self, method_id: u16, request_id: u32, headers: &CallHeaders, req: &T) {
        let mut payload = MsgPackCodec::encode(headers).unwrap();
        payload.extend(MsgPackCodec::encode(&Args::new(req)).unwrap());
        self.send_raw(method_id, flags::REQUEST, request_id, &payload)
            .await;
    }

    async fn send_raw(&mut self, method_id: u16, frame_flags: u8, request_id: u32, payload: &[u8]) {
        let bytes = build_frame(method_id, frame_flags, request_id, payload);
        self.io.write_all(&bytes).await.unwrap();
    }

    async fn abort(&mut self, request_id: u32) {
        self.send_raw(ABORT_METHOD_ID, flags::REQUEST, request_id, b"")
            .await;
    }

    async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
    }

    async fn read_frame(&mut self) -> Option<Frame> {
        let mut buf = vec![0u8; 8192];
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(frame);
            }
            let n = self.io.read(&mut buf).await.unwrap();
            if n == 0 {
                return None;
            }
            self.ready.extend(self.buffer.push(&buf[..n]).unwrap());
        }
    }

    async fn assert_quiet(&mut self) {
        let extra = tokio::time::timeout(Duration::from_millis(100), self.read_frame()).await;
        assert!(extra.is_err(), "unexpected frame: {:?}", extra);
    }
}

fn decode<T: DeserializeOwned>(frame: &Frame) -> T {
    MsgPackCodec::decode(frame.payload()).unwrap()
}

fn fault_code(frame: &Frame) -> SystemErrorCode {
    assert!(frame.is_fault(), "expected fault, got flags {:#x}", frame.flags());
    decode::<SystemError>(frame).code
}

fn start(server: NodeServer) -> (TestClient, Arc<NodeServer>, JoinHandle<nodewire::Result<()>>) {
    let server = Arc::new(server);
    let (client_io, server_io) = duplex(64 * 1024);
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_connection(server_io).await })
    };
    (TestClient::new(client_io), server, task)
}

fn seeded_node() -> Arc<MemoryNode> {
    let node = Arc::new(MemoryNode::new());
    node.insert(
        "metrics",
        Series::new("abc", vec![Tag::new("city", "nyc")])
            .with_point(10 * SEC, 1.5)
            .with_point(20 * SEC, 2.5)
            .with_point(90 * SEC, 9.0),
    );
    node
}

fn node_client() -> TestClient {
    start(NodeServer::builder(node_registry(seeded_node())).build()).0
}

fn fetch(namespace: &str) -> FetchTaggedRequest {
    FetchTaggedRequest {
        namespace: namespace.into(),
        series_ids: vec!["abc".into()],
        range_start: 0,
        range_end: 60,
        fetch_data: true,
        ..Default::default()
    }
}

// Test-only methods exercising server behaviour.

struct Block;
impl Method for Block {
    const NAME: &'static str = "block";
    type Request = ();
    type Success = ();
    type Error = NodeError;
}

struct Pages;
impl Method for Pages {
    const NAME: &'static str = "pages";
    type Request = u32;
    type Success = u32;
    type Error = NodeError;
}

struct Vacant;
impl Method for Vacant {
    const NAME: &'static str = "vacant";
    type Request = ();
    type Success = ();
    type Error = NodeError;
}

struct Unclassified;
impl Method for Unclassified {
    const NAME: &'static str = "unclassified";
    type Request = ();
    type Success = ();
    type Error = NodeError;
}

/// Signals when dropped, i.e. when the handler future is torn down.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

const BLOCK: u16 = 3;
const PAGES: u16 = 4;
const VACANT: u16 = 5;
const UNCLASSIFIED: u16 = 6;

/// Node methods plus the test methods; `block` waits for `release`.
fn test_registry(release: Arc<Notify>, dropped: Option<oneshot::Sender<()>>) -> MethodRegistry {
    let mut registry = node_registry(seeded_node());
    let dropped = Arc::new(parking_lot::Mutex::new(dropped));

    registry.register_fn::<Block, _, _>(move |_ctx, (), _stream| {
        let release = release.clone();
        let guard = DropSignal(dropped.lock().take());
        async move {
            let _guard = guard;
            release.notified().await;
            Ok::<_, HandlerError<NodeError>>(())
        }
    });
    registry.register_fn::<Pages, _, _>(|_ctx, count, stream: ResponseStream| async move {
        for page in 0..count {
            if let Err(e) = stream.send(&page).await {
                return Err(HandlerError::other(e));
            }
        }
        Ok::<_, HandlerError<NodeError>>(count)
    });
    registry.register_fn::<Vacant, _, _>(|_ctx, (), _stream| async move {
        Err::<(), _>(HandlerError::Domain(NodeError::default()))
    });
    registry.register_fn::<Unclassified, _, _>(|_ctx, (), _stream| async move {
        Err::<(), HandlerError<NodeError>>(HandlerError::other("backend unavailable"))
    });
    registry
}

fn test_server() -> NodeServer {
    NodeServer::builder(test_registry(Arc::new(Notify::new()), None)).build()
}

#[tokio::test]
async fn test_fetch_tagged_success() {
    let mut client = node_client();

    client
        .call(FETCH_TAGGED, 1, &CallHeaders::default(), &fetch("metrics"))
        .await;
    let frame = client.next_frame().await;

    assert_eq!(frame.flags(), flags::RESPONSE);
    assert_eq!(frame.method_id(), FETCH_TAGGED);
    assert_eq!(frame.request_id(), 1);

    let response: ResultEnvelope<FetchTaggedResult, NodeError> = decode(&frame);
    assert!(response.err().is_none());
    let result = response.success().unwrap();
    assert!(result.exhaustive);
    assert_eq!(result.elements.len(), 1);
    let values: Vec<f64> = result.elements[0].datapoints.iter().map(|d| d.value).collect();
    assert_eq!(values, vec![1.5, 2.5]);
}

#[tokio::test]
async fn test_domain_error_is_a_response_not_a_fault() {
    let mut client = node_client();

    client
        .call(FETCH_TAGGED, 2, &CallHeaders::default(), &fetch("missing"))
        .await;
    let frame = client.next_frame().await;

    assert_eq!(frame.flags(), flags::RESPONSE);
    let response: ResultEnvelope<FetchTaggedResult, NodeError> = decode(&frame);
    assert!(response.success().is_none());
    assert_eq!(response.err().map(|e| e.kind), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_health() {
    let mut client = node_client();

    client.call(HEALTH, 3, &CallHeaders::default(), &()).await;
    let frame = client.next_frame().await;

    let response: ResultEnvelope<NodeHealthResult, NodeError> = decode(&frame);
    let health = response.success().unwrap();
    assert!(health.ok);
    assert!(health.bootstrapped);
}

#[tokio::test]
async fn test_unknown_method_is_bad_request() {
    let mut client = node_client();

    client.call(99, 4, &CallHeaders::default(), &()).await;
    let frame = client.next_frame().await;

    assert_eq!(frame.request_id(), 4);
    assert_eq!(fault_code(&frame), SystemErrorCode::BadRequest);
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let mut client = node_client();

    client
        .send_raw(FETCH_TAGGED, flags::REQUEST, 5, &[0xc1, 0xff, 0x00])
        .await;
    let frame = client.next_frame().await;

    assert_eq!(fault_code(&frame), SystemErrorCode::BadRequest);
}

#[tokio::test]
async fn test_trailing_bytes_are_bad_request() {
    let mut client = node_client();

    let mut payload = MsgPackCodec::encode(&CallHeaders::default()).unwrap();
    payload.extend(MsgPackCodec::encode(&Args::new(())).unwrap());
    payload.push(0xc0);
    client.send_raw(HEALTH, flags::REQUEST, 6, &payload).await;

    assert_eq!(fault_code(&client.next_frame().await), SystemErrorCode::BadRequest);
}

#[tokio::test]
async fn test_reserved_flag_bits_are_bad_request() {
    let mut client = node_client();

    client.send_raw(HEALTH, 0x80, 7, b"").await;

    assert_eq!(fault_code(&client.next_frame().await), SystemErrorCode::BadRequest);
}

#[tokio::test]
async fn test_vacant_typed_error_is_a_fault() {
    let (mut client, _server, _task) = start(test_server());

    client.call(VACANT, 8, &CallHeaders::default(), &()).await;

    assert_eq!(fault_code(&client.next_frame().await), SystemErrorCode::Unexpected);
}

#[tokio::test]
async fn test_unclassified_error_is_a_fault() {
    let (mut client, _server, _task) = start(test_server());

    client.call(UNCLASSIFIED, 9, &CallHeaders::default(), &()).await;
    let frame = client.next_frame().await;

    assert_eq!(fault_code(&frame), SystemErrorCode::Unexpected);
    assert!(decode::<SystemError>(&frame).message.contains("backend unavailable"));
}

#[tokio::test]
async fn test_stream_chunks_precede_response() {
    let (mut client, _server, _task) = start(test_server());

    client.call(PAGES, 10, &CallHeaders::default(), &3u32).await;

    for expected in 0..3u32 {
        let chunk = client.next_frame().await;
        assert_eq!(chunk.flags(), flags::STREAM_CHUNK);
        assert_eq!(chunk.request_id(), 10);
        assert_eq!(decode::<u32>(&chunk), expected);
    }

    let last = client.next_frame().await;
    assert_eq!(last.flags(), flags::RESPONSE);
    let response: ResultEnvelope<u32, NodeError> = decode(&last);
    assert_eq!(response.success(), Some(&3));
}

#[tokio::test]
async fn test_deadline_yields_timeout_fault() {
    let (mut client, _server, _task) = start(test_server());

    let headers = CallHeaders::default().with_timeout(Duration::from_millis(50));
    client.call(BLOCK, 11, &headers, &()).await;
    let frame = client.next_frame().await;

    assert_eq!(frame.request_id(), 11);
    assert_eq!(fault_code(&frame), SystemErrorCode::Timeout);
}

#[tokio::test]
async fn test_server_default_timeout_applies() {
    let server = NodeServer::builder(test_registry(Arc::new(Notify::new()), None))
        .default_timeout(Some(Duration::from_millis(50)))
        .build();
    let (mut client, _server, _task) = start(server);

    client.call(BLOCK, 12, &CallHeaders::default(), &()).await;

    assert_eq!(fault_code(&client.next_frame().await), SystemErrorCode::Timeout);
}

#[tokio::test]
async fn test_abort_cancels_call_without_response() {
    let (dropped_tx, dropped_rx) = oneshot::channel();
    let server = NodeServer::builder(test_registry(Arc::new(Notify::new()), Some(dropped_tx))).build();
    let (mut client, _server, _task) = start(server);

    client.call(BLOCK, 13, &CallHeaders::default(), &()).await;
    client.abort(13).await;

    tokio::time::timeout(Duration::from_secs(5), dropped_rx)
        .await
        .expect("handler was not cancelled")
        .unwrap();

    client.call(HEALTH, 14, &CallHeaders::default(), &()).await;
    let frame = client.next_frame().await;
    assert_eq!(frame.request_id(), 14);
    client.assert_quiet().await;
}

#[tokio::test]
async fn test_capacity_exhaustion_is_busy() {
    let release = Arc::new(Notify::new());
    let server = NodeServer::builder(test_registry(release.clone(), None))
        .max_concurrent_calls(1)
        .build();
    let (mut client, _server, _task) = start(server);

    client.call(BLOCK, 15, &CallHeaders::default(), &()).await;
    client.call(HEALTH, 16, &CallHeaders::default(), &()).await;

    let busy = client.next_frame().await;
    assert_eq!(busy.request_id(), 16);
    assert_eq!(fault_code(&busy), SystemErrorCode::Busy);

    release.notify_one();
    let done = client.next_frame().await;
    assert_eq!(done.request_id(), 15);
    assert_eq!(done.flags(), flags::RESPONSE);
}

#[tokio::test]
async fn test_duplicate_request_id_is_rejected() {
    let release = Arc::new(Notify::new());
    let (mut client, _server, _task) = start(NodeServer::builder(test_registry(release.clone(), None)).build());

    client.call(BLOCK, 17, &CallHeaders::default(), &()).await;
    client.call(HEALTH, 17, &CallHeaders::default(), &()).await;

    let rejected = client.next_frame().await;
    assert_eq!(rejected.method_id(), HEALTH);
    assert_eq!(fault_code(&rejected), SystemErrorCode::BadRequest);

    release.notify_one();
    assert_eq!(client.next_frame().await.method_id(), BLOCK);
}

#[tokio::test]
async fn test_request_id_reusable_once_reply_is_read() {
    let mut client = node_client();

    for _ in 0..50 {
        client.call(HEALTH, 7, &CallHeaders::default(), &()).await;
        let frame = client.next_frame().await;
        assert_eq!(frame.request_id(), 7);
        assert_eq!(frame.flags(), flags::RESPONSE, "id 7 still marked in flight");
    }
}

#[tokio::test]
async fn test_response_frames_from_client_are_ignored() {
    let mut client = node_client();

    client.send_raw(HEALTH, flags::RESPONSE, 18, b"").await;
    client.call(HEALTH, 19, &CallHeaders::default(), &()).await;

    assert_eq!(client.next_frame().await.request_id(), 19);
    client.assert_quiet().await;
}

#[tokio::test]
async fn test_calls_finish_after_client_closes_write_side() {
    let (mut client, _server, task) = start(NodeServer::builder(node_registry(seeded_node())).build());

    client.call(HEALTH, 20, &CallHeaders::default(), &()).await;
    client.io.shutdown().await.unwrap();

    assert_eq!(client.next_frame().await.request_id(), 20);
    assert!(client.read_frame().await.is_none());
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_calls() {
    let (dropped_tx, dropped_rx) = oneshot::channel();
    let server = NodeServer::builder(test_registry(Arc::new(Notify::new()), Some(dropped_tx))).build();
    let (mut client, server, task) = start(server);

    client.call(BLOCK, 21, &CallHeaders::default(), &()).await;
    // The health response proves the block call has been picked up.
    client.call(HEALTH, 22, &CallHeaders::default(), &()).await;
    assert_eq!(client.next_frame().await.request_id(), 22);

    server.shutdown();

    tokio::time::timeout(Duration::from_secs(5), dropped_rx)
        .await
        .expect("handler was not cancelled")
        .unwrap();
    assert!(task.await.unwrap().is_ok());
    assert!(client.read_frame().await.is_none());
}

#[tokio::test]
async fn test_trace_headers_reach_handler() {
    let mut registry = MethodRegistry::new("trace");
    registry.register_fn::<Block, _, _>(|ctx: CallContext, (), _stream| async move {
        let trace = ctx.trace().copied().unwrap_or_default();
        if trace.trace_id == 77 && ctx.baggage("tenant") == Some("acme") {
            Ok(())
        } else {
            Err(HandlerError::Domain(NodeError::bad_request("trace missing")))
        }
    });
    let (mut client, _server, _task) = start(NodeServer::builder(registry).build());

    let mut headers = CallHeaders::default().with_trace(nodewire::rpc::TraceContext {
        trace_id: 77,
        span_id: 1,
        parent_id: None,
        sampled: true,
    });
    headers.baggage.insert("tenant".into(), "acme".into());
    client.call(1, 23, &headers, &()).await;

    let response: ResultEnvelope<(), NodeError> = decode(&client.next_frame().await);
    assert!(response.err().is_none(), "{:?}", response.err());
}
