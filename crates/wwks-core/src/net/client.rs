//! Single robot connection with liveness probing and recovery.
//!
//! Each `RobotConnection` runs as a tokio task that:
//! 1. Connects to the robot and sends the hello handshake.
//! 2. Reads the stream, reassembles frames and classifies them.
//! 3. Answers robot keep-alives itself and forwards every other known frame.
//! 4. Writes outbound requests, one at a time, from a channel.
//! 5. Probes the link on a fixed interval and recovers once per tick on failure.
//!
//! The task owns the socket, so writers never interleave and the frame buffer
//! has a single reader.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::lifecycle::{Lifecycle, TickAction};
use crate::classify::classify;
use crate::codec;
use crate::config::RobotConfig;
use crate::error::{Result, WwksError};
use crate::framing::{FramePolicy, FrameReader, sanitize_outbound};
use crate::request::{RequestFactory, keep_alive_response};
use crate::time_util::wwks_timestamp;
use crate::types::{ConnectionState, MessageKind, Request};

/// Byte written by the liveness probe; whitespace between documents.
const PROBE_BYTE: &[u8] = b"\n";

const READ_BUF_SIZE: usize = 8192;

/// What the link reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connection state changed.
    State(ConnectionState),
    /// A complete, classified inbound document.
    Frame { kind: MessageKind, xml: String },
}

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Opens byte streams to the robot.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream>;
}

/// Plain TCP with a bounded connect time.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub timeout: Duration,
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| WwksError::Transport(format!("connect to {host}:{port} timed out")))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Endpoint and timing of one link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub probe_interval: Duration,
    pub frame_policy: FramePolicy,
    pub max_frame_bytes: usize,
}

impl LinkConfig {
    pub fn from_robot(robot: &RobotConfig) -> Self {
        Self {
            host: robot.host.clone(),
            port: robot.port,
            probe_interval: Duration::from_millis(robot.probe_interval_ms),
            frame_policy: robot.frame_policy,
            max_frame_bytes: robot.max_frame_bytes,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A robot connection managed by a background tokio task.
pub struct RobotConnection {
    endpoint: String,
    outbound_tx: mpsc::UnboundedSender<Request>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RobotConnection {
    /// Spawn the link task. State changes and frames go to `events`.
    ///
    /// Fails without spawning when the probe interval or frame limit is zero.
    pub fn start<C: Connector>(
        connector: Arc<C>,
        config: LinkConfig,
        factory: Arc<RequestFactory>,
        events: LinkEventSender,
    ) -> Result<Self> {
        if config.probe_interval.is_zero() {
            return Err(WwksError::Config(format!(
                "{}: probe interval must be > 0",
                config.endpoint()
            )));
        }
        if config.max_frame_bytes == 0 {
            return Err(WwksError::Config(format!(
                "{}: frame limit must be > 0",
                config.endpoint()
            )));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Request>();
        let endpoint = config.endpoint();

        let link = Link {
            reader: FrameReader::new(config.frame_policy, config.max_frame_bytes),
            config,
            connector,
            factory,
            events,
            lifecycle: Lifecycle::new(),
            published: None,
            stream: None,
        };
        let task = tokio::spawn(link.run(outbound_rx, shutdown_rx));

        Ok(Self {
            endpoint,
            outbound_tx,
            shutdown_tx,
            task: Some(task),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Queue a request for writing.
    pub fn send(&self, request: Request) -> Result<()> {
        self.outbound_tx.send(request).map_err(|e| {
            WwksError::Transport(format!(
                "link to {} stopped, dropping {}",
                self.endpoint,
                e.0.tag()
            ))
        })
    }

    /// Stop the link and wait for the task to finish.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RobotConnection {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// Link task
// ---------------------------------------------------------------------------

enum Step {
    Shutdown,
    Read(std::io::Result<usize>),
    Outbound(Request),
    Tick,
}

struct Link<C: Connector> {
    config: LinkConfig,
    connector: Arc<C>,
    factory: Arc<RequestFactory>,
    events: LinkEventSender,
    lifecycle: Lifecycle,
    published: Option<ConnectionState>,
    reader: FrameReader,
    stream: Option<C::Stream>,
}

impl<C: Connector> Link<C> {
    async fn run(
        mut self,
        mut outbound_rx: mpsc::UnboundedReceiver<Request>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let endpoint = self.config.endpoint();
        let period = self.config.probe_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; READ_BUF_SIZE];

        self.publish();
        self.establish().await;

        loop {
            let step = tokio::select! {
                _ = shutdown_rx.changed() => Step::Shutdown,
                r = read_some(&mut self.stream, &mut buf) => Step::Read(r),
                Some(request) = outbound_rx.recv() => Step::Outbound(request),
                _ = ticker.tick() => Step::Tick,
            };

            match step {
                Step::Shutdown => {
                    info!("[link] {endpoint}: shutdown requested");
                    if let Some(mut stream) = self.stream.take() {
                        let _ = stream.shutdown().await;
                    }
                    return;
                }
                Step::Read(Ok(0)) => {
                    warn!("[link] {endpoint}: stream closed by robot");
                    self.drop_stream();
                }
                Step::Read(Ok(n)) => match self.reader.push(&buf[..n]) {
                    Ok(frames) => {
                        for frame in frames {
                            self.dispatch(frame).await;
                        }
                    }
                    Err(e) => {
                        warn!("[link] {endpoint}: {e}");
                        self.drop_stream();
                    }
                },
                Step::Read(Err(e)) => {
                    warn!("[link] {endpoint}: read error: {e}");
                    self.drop_stream();
                }
                Step::Outbound(request) => {
                    if self.stream.is_none() {
                        warn!(
                            "[link] {endpoint}: not connected, dropping {} id={}",
                            request.tag(),
                            request.id()
                        );
                        continue;
                    }
                    if let Err(e) = self.write_request(&request).await {
                        warn!("[link] {endpoint}: send {} failed: {e}", request.tag());
                        self.recover().await;
                    }
                }
                Step::Tick => match self.lifecycle.on_tick() {
                    TickAction::Probe => {
                        if let Err(e) = self.write_raw(PROBE_BYTE).await {
                            let probe = self.lifecycle.liveness();
                            warn!("[link] {endpoint}: liveness probe #{probe} failed: {e}");
                            self.recover().await;
                        }
                    }
                    TickAction::Reconnect => self.establish().await,
                    TickAction::Idle => {}
                },
            }
        }
    }

    /// One connect attempt followed by the handshake.
    async fn establish(&mut self) {
        self.lifecycle.begin_connect();
        self.publish();
        info!("[link] connecting to {}", self.config.endpoint());

        let ok = match self.connector.connect(&self.config.host, self.config.port).await {
            Ok(stream) => {
                self.reader.reset();
                self.stream = Some(stream);
                let hello = self.factory.hello();
                match self.write_request(&hello).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("[link] handshake failed: {e}");
                        self.stream = None;
                        false
                    }
                }
            }
            Err(e) => {
                warn!("[link] connect to {} failed: {e}", self.config.endpoint());
                false
            }
        };

        self.lifecycle.on_connect_result(ok);
        self.publish();
    }

    /// Write failure on a live link: degrade, then one immediate attempt.
    async fn recover(&mut self) {
        if !self.lifecycle.on_write_failed() {
            return;
        }
        self.publish();
        self.stream = None;
        self.reader.reset();
        self.establish().await;
    }

    fn drop_stream(&mut self) {
        let pending = self.reader.pending();
        if pending > 0 {
            let err = WwksError::Framing(format!(
                "stream ended inside a frame, discarding {pending} byte(s)"
            ));
            warn!("[link] {err}");
        }
        self.reader.reset();
        self.stream = None;
        self.lifecycle.on_stream_closed();
        self.publish();
    }

    async fn dispatch(&mut self, frame: String) {
        let kind = classify(&frame);
        debug!("[link] <- {kind} ({} bytes)", frame.len());

        match kind {
            MessageKind::Unknown => {
                warn!("[link] dropping unrecognised frame: {}", preview(&frame));
            }
            MessageKind::KeepAliveRequest => match codec::decode(&frame) {
                Ok(envelope) => {
                    if let Some(ping) = envelope.keep_alive_request {
                        if let Err(e) = self.write_request(&keep_alive_response(&ping)).await {
                            warn!("[link] keep-alive answer failed: {e}");
                            self.recover().await;
                        }
                    }
                }
                Err(e) => warn!("[link] undecodable keep-alive: {e}"),
            },
            _ => {
                let _ = self.events.send(LinkEvent::Frame { kind, xml: frame });
            }
        }
    }

    async fn write_request(&mut self, request: &Request) -> Result<()> {
        let xml = codec::encode(request, &wwks_timestamp())?;
        let mut clean = sanitize_outbound(&xml);
        if clean.is_empty() {
            warn!(
                "[link] {} id={} is empty after sanitising, not sent",
                request.tag(),
                request.id()
            );
            return Ok(());
        }
        clean.push('\n');
        debug!("[link] -> {} id={}", request.tag(), request.id());
        self.write_raw(clean.as_bytes()).await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WwksError::Transport("not connected".into()))?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Emit the lifecycle state if it changed since the last emission.
    fn publish(&mut self) {
        let state = self.lifecycle.state();
        if self.published == Some(state) {
            return;
        }
        match state {
            ConnectionState::Connected => info!("[link] {}: {state}", self.config.endpoint()),
            ConnectionState::Connecting => debug!("[link] {}: {state}", self.config.endpoint()),
            _ => warn!("[link] {}: {state}", self.config.endpoint()),
        }
        self.published = Some(state);
        let _ = self.events.send(LinkEvent::State(state));
    }
}

async fn read_some<S: AsyncRead + Unpin>(
    stream: &mut Option<S>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match stream {
        Some(s) => s.read(buf).await,
        None => std::future::pending().await,
    }
}

fn preview(frame: &str) -> &str {
    match frame.char_indices().nth(120) {
        Some((idx, _)) => &frame[..idx],
        None => frame,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};

    use tokio::io::{DuplexStream, ReadBuf};
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::ClientConfig;

    fn factory() -> Arc<RequestFactory> {
        Arc::new(RequestFactory::new(&ClientConfig::default()))
    }

    fn tcp() -> Arc<TcpConnector> {
        Arc::new(TcpConnector {
            timeout: Duration::from_secs(5),
        })
    }

    fn link_config(port: u16, probe_ms: u64) -> LinkConfig {
        LinkConfig {
            host: "127.0.0.1".into(),
            port,
            probe_interval: Duration::from_millis(probe_ms),
            frame_policy: FramePolicy::FirstOnly,
            max_frame_bytes: 64 * 1024,
        }
    }

    /// Read from `stream` until one full document has arrived.
    async fn read_doc<S: AsyncRead + Unpin>(stream: &mut S) -> String {
        let mut acc = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed before a document arrived");
            acc.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&acc).into_owned();
            if text.contains("</WWKS>") {
                return text;
            }
        }
    }

    async fn next_state(rx: &mut LinkEventReceiver) -> ConnectionState {
        loop {
            match rx.recv().await.unwrap() {
                LinkEvent::State(s) => return s,
                LinkEvent::Frame { .. } => {}
            }
        }
    }

    #[tokio::test]
    async fn handshake_then_frames_are_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(port, 60_000);
        let mut conn = RobotConnection::start(tcp(), config, factory(), tx).unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        let hello = read_doc(&mut server).await;
        assert!(hello.contains("<HelloRequest"), "{hello}");
        assert!(hello.ends_with("</WWKS>\n"), "{hello}");

        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);

        let doc = r#"<WWKS Version="2.0"><StockInfoResponse Id="1[X1]" Source="999"/></WWKS>"#;
        let (a, b) = doc.split_at(30);
        server.write_all(a.as_bytes()).await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.write_all(b.as_bytes()).await.unwrap();

        match rx.recv().await.unwrap() {
            LinkEvent::Frame { kind, xml } => {
                assert_eq!(kind, MessageKind::StockInfoResponse);
                assert_eq!(xml, doc);
            }
            other => panic!("unexpected {other:?}"),
        }

        conn.send(factory().status()).unwrap();
        let status = read_doc(&mut server).await;
        assert!(status.contains("<StatusRequest"), "{status}");

        conn.stop().await;
    }

    #[tokio::test]
    async fn keep_alive_is_answered_not_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(port, 60_000);
        let mut conn = RobotConnection::start(tcp(), config, factory(), tx).unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        read_doc(&mut server).await;

        let ping = r#"<WWKS><KeepAliveRequest Id="77" Source="999" Destination="100"/></WWKS>"#;
        server.write_all(ping.as_bytes()).await.unwrap();
        let pong = read_doc(&mut server).await;
        let expected = r#"<KeepAliveResponse Id="77" Source="100" Destination="999"/>"#;
        assert!(pong.contains(expected), "{pong}");

        let out = r#"<WWKS><OutputMessage Id="A1"><Details/></OutputMessage></WWKS>"#;
        server.write_all(out.as_bytes()).await.unwrap();
        loop {
            match rx.recv().await.unwrap() {
                LinkEvent::State(_) => continue,
                LinkEvent::Frame { kind, .. } => {
                    assert_eq!(kind, MessageKind::OutputMessage);
                    break;
                }
            }
        }
        conn.stop().await;
    }

    #[tokio::test]
    async fn peer_close_discards_partial_frame_and_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(port, 60_000);
        let mut conn = RobotConnection::start(tcp(), config, factory(), tx).unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        read_doc(&mut server).await;
        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);

        server.write_all(b"<WWKS><OutputMessage Id=\"1\">").await.unwrap();
        drop(server);

        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        conn.stop().await;
    }

    #[tokio::test]
    async fn oversized_frame_drops_the_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = LinkConfig {
            max_frame_bytes: 256,
            ..link_config(port, 60_000)
        };
        let mut conn = RobotConnection::start(tcp(), config, factory(), tx).unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        read_doc(&mut server).await;
        while next_state(&mut rx).await != ConnectionState::Connected {}

        // Never terminated, so the frame outgrows the limit.
        server.write_all(b"<WWKS>").await.unwrap();
        server.write_all(&[b'x'; 1024]).await.unwrap();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        conn.stop().await;
    }

    #[tokio::test]
    async fn refused_connect_stays_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(port, 60_000);
        let mut conn = RobotConnection::start(tcp(), config, factory(), tx).unwrap();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        conn.stop().await;
    }

    #[tokio::test]
    async fn zero_probe_interval_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(6050, 0);
        let err = RobotConnection::start(tcp(), config, factory(), tx).err();
        assert!(matches!(err, Some(WwksError::Config(_))), "{err:?}");
        // Nothing was spawned, so the sender is already gone.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn zero_frame_limit_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = LinkConfig {
            max_frame_bytes: 0,
            ..link_config(6050, 3000)
        };
        let result = RobotConnection::start(tcp(), config, factory(), tx);
        assert!(matches!(result, Err(WwksError::Config(_))));
    }

    // -- In-memory transport whose writes can be made to fail ---------------

    struct Flaky {
        inner: DuplexStream,
        broken: Arc<AtomicBool>,
    }

    impl AsyncRead for Flaky {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for Flaky {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            if this.broken.load(Ordering::SeqCst) {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            Pin::new(&mut this.inner).poll_write(cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_flush(cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
        }
    }

    struct MemoryConnector {
        servers: mpsc::UnboundedSender<DuplexStream>,
        broken: Arc<AtomicBool>,
        refuse: Arc<AtomicBool>,
    }

    impl MemoryConnector {
        fn new(
            servers: mpsc::UnboundedSender<DuplexStream>,
            broken: &Arc<AtomicBool>,
            refuse: &Arc<AtomicBool>,
        ) -> Arc<Self> {
            Arc::new(Self {
                servers,
                broken: broken.clone(),
                refuse: refuse.clone(),
            })
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Stream = Flaky;

        async fn connect(&self, _host: &str, _port: u16) -> Result<Flaky> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(WwksError::Transport("refused".into()));
            }
            let (client, server) = tokio::io::duplex(64 * 1024);
            self.broken.store(false, Ordering::SeqCst);
            let _ = self.servers.send(server);
            Ok(Flaky {
                inner: client,
                broken: self.broken.clone(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_recovers_and_resends_hello() {
        let (servers_tx, mut servers) = mpsc::unbounded_channel();
        let broken = Arc::new(AtomicBool::new(false));
        let refuse = Arc::new(AtomicBool::new(false));
        let connector = MemoryConnector::new(servers_tx, &broken, &refuse);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(6050, 3000);
        let mut conn = RobotConnection::start(connector, config, factory(), tx).unwrap();

        let mut first = servers.recv().await.unwrap();
        assert!(read_doc(&mut first).await.contains("<HelloRequest"));
        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);

        // A healthy probe is a single newline.
        let mut byte = [0u8; 1];
        first.read_exact(&mut byte).await.unwrap();
        assert_eq!(&byte, b"\n");

        broken.store(true, Ordering::SeqCst);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Degraded);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);

        let mut second = servers.recv().await.unwrap();
        assert!(read_doc(&mut second).await.contains("<HelloRequest"));
        conn.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recovery_waits_for_next_tick() {
        let (servers_tx, mut servers) = mpsc::unbounded_channel();
        let broken = Arc::new(AtomicBool::new(false));
        let refuse = Arc::new(AtomicBool::new(false));
        let connector = MemoryConnector::new(servers_tx, &broken, &refuse);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = link_config(6050, 3000);
        let mut conn = RobotConnection::start(connector, config, factory(), tx).unwrap();

        let _first = servers.recv().await.unwrap();
        while next_state(&mut rx).await != ConnectionState::Connected {}

        broken.store(true, Ordering::SeqCst);
        refuse.store(true, Ordering::SeqCst);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Degraded);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        let failed_at = Instant::now();

        refuse.store(false, Ordering::SeqCst);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert!(Instant::now() - failed_at >= Duration::from_millis(3000));
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);
        conn.stop().await;
    }
}
