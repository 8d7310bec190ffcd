//! Node server: accept loop and per-connection call handling.
//!
//! Each accepted connection gets:
//! 1. A writer task owning the write half
//! 2. A read loop turning frames into calls
//! 3. One task per call, bounded by a semaphore
//!
//! A call frame carries a [`CallHeaders`] envelope and the method arguments.
//! The call's response, or a fault frame, goes back with the same request ID.
//! An abort frame (`method_id = 0xFFFF`) cancels the call with its request ID.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodewire::node::{node_registry, MemoryNode};
//! use nodewire::server::NodeServer;
//! use nodewire::transport::Listener;
//!
//! let server = NodeServer::builder(node_registry(Arc::new(MemoryNode::new())))
//!     .max_concurrent_calls(512)
//!     .build();
//!
//! let listener = Listener::bind(&"tcp://0.0.0.0:9000".parse()?).await?;
//! server.serve(listener).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::codec::MsgPackCodec;
use crate::error::{Result, RpcError};
use crate::protocol::{
    flags, BinaryProtocol, Frame, FrameBuffer, Header, DEFAULT_MAX_PAYLOAD_SIZE,
};
use crate::rpc::{
    CallContext, CallHeaders, MethodRegistry, ResponseStream, ServiceSchema, SystemError,
    SystemErrorCode,
};
use crate::transport::Listener;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default maximum concurrent calls per connection.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 256;

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for a [`NodeServer`].
pub struct NodeServerBuilder {
    registry: MethodRegistry,
    writer_config: WriterConfig,
    max_concurrent_calls: usize,
    default_timeout: Option<Duration>,
    max_payload_size: u32,
}

impl NodeServerBuilder {
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry,
            writer_config: WriterConfig::default(),
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            default_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Calls allowed in flight per connection; excess calls get a `Busy` fault.
    ///
    /// Default: 256
    pub fn max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit;
        self
    }

    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.writer_config.max_pending_frames = limit;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.writer_config.backpressure_timeout = timeout;
        self
    }

    /// Timeout for calls whose headers carry none. Default: no timeout.
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Largest accepted frame payload. Default: 64 MiB
    pub fn max_payload_size(mut self, bytes: u32) -> Self {
        self.max_payload_size = bytes;
        self
    }

    pub fn build(self) -> NodeServer {
        NodeServer {
            shared: Arc::new(Shared {
                registry: self.registry,
                writer_config: self.writer_config,
                max_concurrent_calls: self.max_concurrent_calls,
                default_timeout: self.default_timeout,
                max_payload_size: self.max_payload_size,
            }),
            shutdown: CancellationToken::new(),
        }
    }
}

struct Shared {
    registry: MethodRegistry,
    writer_config: WriterConfig,
    max_concurrent_calls: usize,
    default_timeout: Option<Duration>,
    max_payload_size: u32,
}

/// Serves a method table over any number of connections.
pub struct NodeServer {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl NodeServer {
    pub fn builder(registry: MethodRegistry) -> NodeServerBuilder {
        NodeServerBuilder::new(registry)
    }

    pub fn schema(&self) -> ServiceSchema {
        self.shared.registry.build_schema()
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting, close every connection and cancel in-flight calls.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Accept connections until shutdown.
    pub async fn serve(&self, listener: Listener) -> Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => {
                    let (conn, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    tracing::info!(%peer, "Connection accepted");

                    let handler = self.connection_handler();
                    let span = tracing::info_span!("rpc.connection", %peer);
                    connections.spawn(
                        async move {
                            if let Err(e) = handler.serve_connection(conn).await {
                                tracing::warn!(error = %e, "Connection ended with error");
                            }
                            tracing::info!("Connection closed");
                        }
                        .instrument(span),
                    );
                }
            }
        }

        while connections.join_next().await.is_some() {}
        Ok(())
    }

    /// Serve a single already-established connection until it closes.
    ///
    /// On a clean close the in-flight calls finish first; on shutdown or a
    /// read error they are cancelled.
    pub async fn serve_connection<IO>(&self, io: IO) -> Result<()>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.connection_handler().serve_connection(io).await
    }

    fn connection_handler(&self) -> ConnectionHandler {
        ConnectionHandler {
            shared: self.shared.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

#[derive(Clone)]
struct ConnectionHandler {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    async fn serve_connection<IO>(self, io: IO) -> Result<()>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(io);
        let (writer, writer_task) =
            spawn_writer_task(write_half, self.shared.writer_config.clone());

        let conn = ConnectionState {
            semaphore: Arc::new(Semaphore::new(self.shared.max_concurrent_calls)),
            shared: self.shared,
            writer,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            token: self.shutdown.child_token(),
        };

        let result = conn.run(reader).await;

        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Writer task failed"),
            Err(e) => tracing::error!(error = %e, "Writer task panicked"),
        }

        result
    }
}

type InFlight = Arc<Mutex<HashMap<u32, CancellationToken>>>;

/// State of one connection's read loop.
struct ConnectionState {
    shared: Arc<Shared>,
    writer: WriterHandle,
    semaphore: Arc<Semaphore>,
    in_flight: InFlight,
    token: CancellationToken,
}

impl ConnectionState {
    async fn run<R: AsyncRead + Unpin>(self, mut reader: R) -> Result<()> {
        let mut frame_buffer = FrameBuffer::with_max_payload(self.shared.max_payload_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut calls = JoinSet::new();

        let result = loop {
            tokio::select! {
                _ = self.token.cancelled() => break Ok(()),
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Call task panicked");
                    }
                }
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => break Ok(()),
                        Ok(n) => n,
                        Err(e) => break Err(RpcError::Io(e)),
                    };

                    let frames = match frame_buffer.push(&buf[..n]) {
                        Ok(frames) => frames,
                        Err(e) => break Err(e),
                    };

                    for frame in frames {
                        self.on_frame(frame, &mut calls).await;
                    }
                }
            }
        };

        if result.is_err() {
            self.token.cancel();
        }
        while calls.join_next().await.is_some() {}

        result
    }

    async fn on_frame(&self, frame: Frame, calls: &mut JoinSet<()>) {
        let header = frame.header;

        if header.is_abort() {
            match self.in_flight.lock().get(&header.request_id) {
                Some(token) => {
                    tracing::debug!(request_id = header.request_id, "Abort received");
                    token.cancel();
                }
                None => {
                    tracing::debug!(request_id = header.request_id, "Abort for unknown call")
                }
            }
            return;
        }

        if header.is_response() {
            tracing::warn!(
                method_id = header.method_id,
                request_id = header.request_id,
                "Unexpected response frame"
            );
            return;
        }

        if let Err(e) = header.validate(self.shared.max_payload_size) {
            self.reject(&header, &e).await;
            return;
        }

        if self.shared.registry.get(header.method_id).is_none() {
            self.reject(&header, &RpcError::MethodNotFound(header.method_id))
                .await;
            return;
        }

        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            tracing::warn!(
                method_id = header.method_id,
                request_id = header.request_id,
                "Call capacity reached"
            );
            let fault = SystemError::new(
                SystemErrorCode::Busy,
                format!(
                    "{} calls already in flight",
                    self.shared.max_concurrent_calls
                ),
            );
            send_fault(&self.writer, &header, &fault).await;
            return;
        };

        let token = self.token.child_token();
        let duplicate = {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&header.request_id) {
                true
            } else {
                in_flight.insert(header.request_id, token.clone());
                false
            }
        };
        if duplicate {
            let err = RpcError::Protocol(format!(
                "request ID {} is already in flight",
                header.request_id
            ));
            self.reject(&header, &err).await;
            return;
        }

        let shared = self.shared.clone();
        let writer = self.writer.clone();
        let in_flight = self.in_flight.clone();

        calls.spawn(async move {
            let _permit = permit;
            run_call(&shared, frame, token, &writer, &in_flight).await;
        });
    }

    async fn reject(&self, header: &Header, err: &RpcError) {
        tracing::debug!(
            method_id = header.method_id,
            request_id = header.request_id,
            error = %err,
            "Rejecting call"
        );
        if let Some(fault) = SystemError::from_rpc_error(err) {
            send_fault(&self.writer, header, &fault).await;
        }
    }
}

/// Run one call and write its response or fault.
///
/// The request ID is released before anything is written, so a client may
/// reuse it as soon as it sees the reply.
async fn run_call(
    shared: &Shared,
    frame: Frame,
    token: CancellationToken,
    writer: &WriterHandle,
    in_flight: &InFlight,
) {
    let header = frame.header;
    let mut protocol = BinaryProtocol::new(frame.payload);

    let outcome = execute(shared, &header, &mut protocol, token.clone(), writer).await;
    in_flight.lock().remove(&header.request_id);

    match outcome {
        Ok(payload) if token.is_cancelled() => {
            tracing::debug!(
                request_id = header.request_id,
                bytes = payload.len(),
                "Call cancelled after encoding; response dropped"
            );
        }
        Ok(payload) => {
            let frame =
                OutboundFrame::new(header.method_id, flags::RESPONSE, header.request_id, payload);
            if let Err(e) = writer.send(frame).await {
                tracing::warn!(request_id = header.request_id, error = %e, "Response not sent");
            }
        }
        Err(e) => match SystemError::from_rpc_error(&e) {
            Some(fault) => send_fault(writer, &header, &fault).await,
            None => tracing::debug!(request_id = header.request_id, error = %e, "No response"),
        },
    }
}

async fn execute(
    shared: &Shared,
    header: &Header,
    protocol: &mut BinaryProtocol,
    token: CancellationToken,
    writer: &WriterHandle,
) -> Result<Bytes> {
    let headers: CallHeaders = protocol.read()?;
    let ctx = CallContext::from_headers(
        header.method_id,
        header.request_id,
        headers,
        shared.default_timeout,
    )
    .with_cancellation(token);
    let stream = ResponseStream::with_writer(header.method_id, header.request_id, writer.clone());

    shared
        .registry
        .dispatch(header.method_id, ctx, protocol, stream)
        .await?;

    Ok(protocol.take_output())
}

async fn send_fault(writer: &WriterHandle, header: &Header, fault: &SystemError) {
    let payload = match MsgPackCodec::encode(fault) {
        Ok(payload) => Bytes::from(payload),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode fault");
            return;
        }
    };

    let frame = OutboundFrame::new(header.method_id, flags::FAULT, header.request_id, payload);
    if let Err(e) = writer.send(frame).await {
        tracing::warn!(request_id = header.request_id, error = %e, "Fault not sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = NodeServer::builder(MethodRegistry::new("test"))
            .max_concurrent_calls(8)
            .max_pending_frames(2048)
            .channel_capacity(512)
            .backpressure_timeout(Duration::from_secs(10))
            .default_timeout(Some(Duration::from_secs(30)))
            .max_payload_size(1024);

        assert_eq!(builder.max_concurrent_calls, 8);
        assert_eq!(builder.writer_config.max_pending_frames, 2048);
        assert_eq!(builder.writer_config.channel_capacity, 512);
        assert_eq!(
            builder.writer_config.backpressure_timeout,
            Duration::from_secs(10)
        );
        assert_eq!(builder.default_timeout, Some(Duration::from_secs(30)));
        assert_eq!(builder.max_payload_size, 1024);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = NodeServerBuilder::new(MethodRegistry::new("test"));

        assert_eq!(builder.max_concurrent_calls, DEFAULT_MAX_CONCURRENT_CALLS);
        assert_eq!(builder.default_timeout, None);
        assert_eq!(builder.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[tokio::test]
    async fn test_shutdown_stops_serve() {
        let server = NodeServer::builder(MethodRegistry::new("test")).build();
        let listener = Listener::bind(&"tcp://127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        server.shutdown();

        assert!(server.serve(listener).await.is_ok());
    }
}
