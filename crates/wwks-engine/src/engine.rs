//! The engine task and its handle.
//!
//! One tokio task owns the [`Reconciler`], the event bus and the robot
//! connection. Link events, caller commands, debounced searches and timers
//! are all funnelled through a single `select!` loop, so stock and order
//! state have exactly one writer and outbound requests leave in the order
//! reconciliation produced them.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use wwks_core::config::{AppConfig, ClientConfig, RobotConfig};
use wwks_core::error::{Result, WwksError};
use wwks_core::net::{
    Connector, LinkConfig, LinkEvent, LinkEventReceiver, RobotConnection, TcpConnector,
};
use wwks_core::request::RequestFactory;
use wwks_core::{ConnectionState, OutputOrder, StockItem};

use crate::debounce::{Debouncer, Fired};
use crate::event::{EngineEventReceiver, EventBus};
use crate::reconcile::{Effects, OutputIntent, Reconciler};

/// Search terms shorter than this are not probed.
const MIN_SEARCH_CHARS: usize = 2;

/// Settings the engine runs with, built once at startup.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub robot: RobotConfig,
    pub client: ClientConfig,
}

impl EngineContext {
    pub fn new(robot: RobotConfig, client: ClientConfig) -> Self {
        Self { robot, client }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.robot.clone(), config.client.clone())
    }

    /// Same checks as the config file loader.
    pub fn validate(&self) -> Result<()> {
        self.robot.validate()?;
        self.client.validate()
    }
}

/// Point-in-time copy of the engine's state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub connection: ConnectionState,
    pub status_text: String,
    pub stock: Vec<StockItem>,
    pub orders: Vec<OutputOrder>,
}

enum Command {
    Connect { host: String, port: u16 },
    Refresh,
    RequestOutput {
        article_id: String,
        quantity: u32,
        priority: Option<String>,
        destination: Option<String>,
        reply: oneshot::Sender<Result<OutputIntent>>,
    },
    Search(String),
    CancelDebounce,
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Subscribe(oneshot::Sender<EngineEventReceiver>),
    Shutdown,
}

/// Cloneable handle used by collaborators to drive the engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    fn command(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| WwksError::Engine("engine stopped".into()))
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command(make(reply))?;
        rx.await
            .map_err(|_| WwksError::Engine("engine stopped before replying".into()))
    }

    /// (Re)connect to a robot endpoint, replacing any current link.
    pub fn connect(&self, host: impl Into<String>, port: u16) -> Result<()> {
        self.command(Command::Connect {
            host: host.into(),
            port,
        })
    }

    /// Full stock refresh.
    pub fn refresh(&self) -> Result<()> {
        self.command(Command::Refresh)
    }

    /// Dispense `quantity` packs of `article_id`. Priority and destination
    /// default to the configured values.
    pub async fn request_output(
        &self,
        article_id: impl Into<String>,
        quantity: u32,
        priority: Option<String>,
        destination: Option<String>,
    ) -> Result<OutputIntent> {
        let article_id = article_id.into();
        self.ask(|reply| Command::RequestOutput {
            article_id,
            quantity,
            priority,
            destination,
            reply,
        })
        .await?
    }

    /// Debounced targeted probe for the configured prefix plus `term`.
    pub fn search(&self, term: impl Into<String>) -> Result<()> {
        self.command(Command::Search(term.into()))
    }

    /// Drop a pending search before it fires.
    pub fn cancel_debounce(&self) -> Result<()> {
        self.command(Command::CancelDebounce)
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.ask(Command::Snapshot).await
    }

    /// Register for engine events. The subscription ends when the receiver
    /// is dropped.
    pub async fn subscribe(&self) -> Result<EngineEventReceiver> {
        self.ask(Command::Subscribe).await
    }

    /// Stop the engine and its link. The engine also stops once every handle
    /// is dropped.
    pub fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown)
    }
}

pub struct Engine;

impl Engine {
    /// Start the engine over plain TCP.
    pub fn start(ctx: EngineContext) -> Result<(EngineHandle, JoinHandle<()>)> {
        let connector = Arc::new(TcpConnector {
            timeout: Duration::from_millis(ctx.robot.connect_timeout_ms),
        });
        Self::start_with(ctx, connector)
    }

    /// Start the engine with a custom transport. Nothing is spawned when
    /// `ctx` fails validation.
    pub fn start_with<C: Connector>(
        ctx: EngineContext,
        connector: Arc<C>,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        ctx.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (debouncer, search_rx) = Debouncer::new(Duration::from_millis(ctx.client.debounce_ms));
        let factory = Arc::new(RequestFactory::new(&ctx.client));

        let task = EngineTask {
            reconciler: Reconciler::new(factory.clone(), ctx.client.probe_filter.clone()),
            bus: EventBus::new(),
            connection: None,
            link_tx,
            debouncer,
            factory,
            connector,
            ctx,
        };
        let join = tokio::spawn(task.run(cmd_rx, link_rx, search_rx));
        Ok((EngineHandle { tx: cmd_tx }, join))
    }
}

// ---------------------------------------------------------------------------
// Engine task
// ---------------------------------------------------------------------------

enum Step {
    Stop,
    Command(Command),
    Link(LinkEvent),
    Search(Fired<String>),
    Refresh,
    FollowUp,
}

struct EngineTask<C: Connector> {
    ctx: EngineContext,
    connector: Arc<C>,
    factory: Arc<RequestFactory>,
    reconciler: Reconciler,
    bus: EventBus,
    connection: Option<RobotConnection>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    debouncer: Debouncer<String>,
}

impl<C: Connector> EngineTask<C> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut link_rx: LinkEventReceiver,
        mut search_rx: mpsc::UnboundedReceiver<Fired<String>>,
    ) {
        let client = &self.ctx.client;
        let mut refresh = client
            .refresh_interval_secs
            .and_then(|s| ticker(Duration::from_secs(s)));
        let order_timeout = client.order_timeout_secs.map(Duration::from_secs);
        let mut follow_up = order_timeout.and_then(ticker);
        info!("[engine] started (source {})", self.factory.source());

        loop {
            let step = tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => Step::Stop,
                    Some(cmd) => Step::Command(cmd),
                },
                Some(event) = link_rx.recv() => Step::Link(event),
                Some(fired) = search_rx.recv() => Step::Search(fired),
                _ = tick(&mut refresh) => Step::Refresh,
                _ = tick(&mut follow_up) => Step::FollowUp,
            };

            let fx = match step {
                Step::Stop => break,
                Step::Command(cmd) => self.on_command(cmd).await,
                Step::Link(LinkEvent::State(state)) => self.reconciler.on_link_state(state),
                Step::Link(LinkEvent::Frame { kind, xml }) => {
                    self.reconciler.on_frame(kind, &xml)
                }
                Step::Search(fired) if self.debouncer.is_current(&fired) => {
                    debug!("[engine] search probe for {}", fired.value);
                    self.reconciler.probe_article(&fired.value)
                }
                Step::Search(_) => Effects::default(),
                Step::Refresh if self.reconciler.connection() == ConnectionState::Connected => {
                    self.reconciler.full_refresh()
                }
                Step::Refresh => Effects::default(),
                Step::FollowUp => match order_timeout {
                    Some(max_age) => self.reconciler.follow_up(Instant::now(), max_age),
                    None => Effects::default(),
                },
            };
            self.apply(fx);
        }

        self.debouncer.cancel();
        if let Some(mut connection) = self.connection.take() {
            connection.stop().await;
        }
        info!("[engine] stopped");
    }

    async fn on_command(&mut self, cmd: Command) -> Effects {
        match cmd {
            Command::Connect { host, port } => {
                self.connect(host, port).await;
                Effects::default()
            }
            Command::Refresh => {
                if self.reconciler.connection() == ConnectionState::Connected {
                    self.reconciler.full_refresh()
                } else {
                    let state = self.reconciler.connection();
                    warn!("[engine] refresh ignored, robot link is {state}");
                    Effects::default()
                }
            }
            Command::RequestOutput {
                article_id,
                quantity,
                priority,
                destination,
                reply,
            } => {
                let client = &self.ctx.client;
                let priority = priority.unwrap_or_else(|| client.priority.clone());
                let destination = destination.unwrap_or_else(|| client.output_destination.clone());
                let now = Instant::now();
                match self
                    .reconciler
                    .request_output(&article_id, quantity, &priority, &destination, now)
                {
                    Ok((intent, fx)) => {
                        let _ = reply.send(Ok(intent));
                        fx
                    }
                    Err(e) => {
                        warn!("[engine] output request rejected: {e}");
                        let _ = reply.send(Err(e));
                        Effects::default()
                    }
                }
            }
            Command::Search(term) => {
                let term = term.trim();
                if term.chars().count() < MIN_SEARCH_CHARS {
                    debug!("[engine] search term '{term}' too short");
                } else {
                    let article_id = format!("{}{term}", self.ctx.client.search_prefix);
                    self.debouncer.schedule(article_id);
                }
                Effects::default()
            }
            Command::CancelDebounce => {
                if self.debouncer.cancel() {
                    debug!("[engine] pending search cancelled");
                }
                Effects::default()
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(EngineSnapshot {
                    connection: self.reconciler.connection(),
                    status_text: self.reconciler.status_text().to_string(),
                    stock: self.reconciler.stock().snapshot(),
                    orders: self.reconciler.orders().snapshot(),
                });
                Effects::default()
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(self.bus.subscribe());
                debug!("[engine] {} subscriber(s)", self.bus.subscriber_count());
                Effects::default()
            }
            // Handled by the loop.
            Command::Shutdown => Effects::default(),
        }
    }

    /// Replace the current link. An invalid endpoint leaves the old link up.
    async fn connect(&mut self, host: String, port: u16) {
        let robot = RobotConfig {
            host,
            port,
            ..self.ctx.robot.clone()
        };
        if let Err(e) = robot.validate() {
            warn!("[engine] connect ignored: {e}");
            return;
        }

        if let Some(mut old) = self.connection.take() {
            info!("[engine] leaving {}", old.endpoint());
            old.stop().await;
        }
        let config = LinkConfig::from_robot(&robot);
        info!("[engine] robot endpoint {}", config.endpoint());
        self.ctx.robot = robot;
        let connector = self.connector.clone();
        let factory = self.factory.clone();
        match RobotConnection::start(connector, config, factory, self.link_tx.clone()) {
            Ok(connection) => self.connection = Some(connection),
            Err(e) => warn!("[engine] robot link not started: {e}"),
        }
    }

    fn apply(&mut self, fx: Effects) {
        for request in fx.outbound {
            match &self.connection {
                Some(connection) => {
                    if let Err(e) = connection.send(request) {
                        warn!("[engine] {e}");
                    }
                }
                None => warn!(
                    "[engine] no robot link, dropping {} id={}",
                    request.tag(),
                    request.id()
                ),
            }
        }
        for event in fx.events {
            self.bus.publish(event);
        }
    }
}

/// Interval whose first tick is one period away; `None` for a zero period.
fn ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

/// Tick of an optional interval; never completes when the interval is off.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wwks_core::DisplayState;

    use super::*;
    use crate::event::EngineEvent;

    const WAIT: Duration = Duration::from_secs(5);

    /// Robot side of a test connection.
    struct Peer {
        stream: TcpStream,
        buf: String,
    }

    impl Peer {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
                .await
                .unwrap()
                .unwrap();
            Self {
                stream,
                buf: String::new(),
            }
        }

        async fn next_doc(&mut self) -> String {
            loop {
                if let Some(pos) = self.buf.find("</WWKS>") {
                    let end = pos + "</WWKS>".len();
                    let doc = self.buf[..end].trim().to_string();
                    self.buf.drain(..end);
                    return doc;
                }
                let mut chunk = [0u8; 4096];
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed the link");
                self.buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
            }
        }

        async fn send(&mut self, body: &str) {
            let head = r#"<WWKS Version="2.0" TimeStamp="2024-01-01T12:00:00Z">"#;
            let doc = format!("{head}{body}</WWKS>");
            self.stream.write_all(doc.as_bytes()).await.unwrap();
        }
    }

    fn request_id(doc: &str, tag: &str) -> String {
        let start = doc.find(&format!("<{tag} Id=\"")).unwrap() + tag.len() + 6;
        let len = doc[start..].find('"').unwrap();
        doc[start..start + len].to_string()
    }

    fn context(port: u16) -> EngineContext {
        let mut robot = RobotConfig::new("127.0.0.1", port);
        robot.connect_timeout_ms = 2000;
        EngineContext::new(robot, ClientConfig::default())
    }

    async fn wait_for(
        events: &mut EngineEventReceiver,
        wanted: impl Fn(&EngineEvent) -> bool,
    ) -> EngineEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                let event = events.recv().await.unwrap();
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn is_connected(event: &EngineEvent) -> bool {
        matches!(
            event,
            EngineEvent::ConnectivityChanged {
                state: ConnectionState::Connected,
                ..
            }
        )
    }

    #[tokio::test]
    async fn handshake_refresh_and_output_flow() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (handle, join) = Engine::start(context(port)).unwrap();
        let mut events = handle.subscribe().await.unwrap();
        handle.connect("127.0.0.1", port).unwrap();

        let mut robot = Peer::accept(&listener).await;
        assert!(robot.next_doc().await.contains("<HelloRequest"));
        wait_for(&mut events, is_connected).await;

        let subscriber = r#"<Subscriber Id="999" Type="SSS"/>"#;
        robot
            .send(&format!(r#"<HelloResponse Id="1">{subscriber}</HelloResponse>"#))
            .await;
        assert!(robot.next_doc().await.contains("<StatusRequest"));
        let stock_req = robot.next_doc().await;
        let refresh_id = request_id(&stock_req, "StockInfoRequest");
        let article = r#"<Article Id="Z9" Name="Z" Quantity="5"/>"#;
        let body = format!(r#"<StockInfoResponse Id="{refresh_id}">{article}</StockInfoResponse>"#);
        robot.send(&body).await;
        wait_for(&mut events, |e| {
            matches!(e, EngineEvent::ArticleChanged { quantity: 5, .. })
        })
        .await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Connected);
        assert_eq!(snapshot.stock.len(), 1);

        let intent = handle.request_output("Z9", 2, None, None).await.unwrap();
        let OutputIntent::Created(order_id) = intent else {
            panic!("expected a new order");
        };
        let output = robot.next_doc().await;
        assert_eq!(request_id(&output, "OutputRequest"), order_id);
        let details = r#"<Details Priority="Normal" OutputDestination="001"/>"#;
        assert!(output.contains(details), "{output}");

        let again = handle.request_output("Z9", 1, None, None).await.unwrap();
        assert_eq!(again, OutputIntent::Redirected(order_id.clone()));
        let task_query = format!(r#"<Task Type="Output" Id="{order_id}"/>"#);
        assert!(robot.next_doc().await.contains(&task_query));

        let task = format!(r#"<Task Type="Output" Id="{order_id}" Status="Completed"/>"#);
        robot
            .send(&format!(r#"<TaskInfoResponse Id="1">{task}</TaskInfoResponse>"#))
            .await;
        let changed = wait_for(&mut events, |e| {
            matches!(
                e,
                EngineEvent::ArticleChanged {
                    display: DisplayState::Green,
                    ..
                }
            )
        })
        .await;
        let expected = EngineEvent::ArticleChanged {
            article_id: "Z9".into(),
            quantity: 3,
            display: DisplayState::Green,
        };
        assert_eq!(changed, expected);
        assert!(handle.snapshot().await.unwrap().orders.is_empty());

        handle.shutdown().unwrap();
        join.await.unwrap();
        assert!(handle.refresh().is_err());
    }

    #[tokio::test]
    async fn search_sends_only_the_latest_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (handle, join) = Engine::start(context(port)).unwrap();
        handle.connect("127.0.0.1", port).unwrap();

        let mut robot = Peer::accept(&listener).await;
        robot.next_doc().await;

        handle.search("1").unwrap();
        handle.search("12").unwrap();
        handle.search("123").unwrap();
        let probe = robot.next_doc().await;
        assert!(probe.contains(r#"<Criteria ArticleId="RoWa123""#), "{probe}");
        assert!(request_id(&probe, "StockInfoRequest").ends_with("[RoWa123]"));

        handle.search("456").unwrap();
        handle.cancel_debounce().unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(400), robot.next_doc()).await;
        assert!(quiet.is_err(), "cancelled search still fired");

        handle.shutdown().unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn output_requires_a_connected_robot() {
        let (handle, join) = Engine::start(context(6050)).unwrap();
        let err = handle.request_output("Z9", 1, None, None).await.unwrap_err();
        assert!(matches!(err, WwksError::Engine(_)));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.status_text, "unknown");

        drop(handle);
        join.await.unwrap();
    }

    #[tokio::test]
    async fn zero_timings_are_rejected_at_start() {
        let mut ctx = context(6050);
        ctx.client.order_timeout_secs = Some(0);
        assert!(matches!(Engine::start(ctx), Err(WwksError::Config(_))));

        let mut ctx = context(6050);
        ctx.robot.probe_interval_ms = 0;
        assert!(matches!(Engine::start(ctx), Err(WwksError::Config(_))));

        let mut ctx = context(6050);
        ctx.robot.connect_timeout_ms = 0;
        assert!(matches!(Engine::start(ctx), Err(WwksError::Config(_))));
    }

    #[tokio::test]
    async fn invalid_endpoint_keeps_the_engine_running() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (handle, join) = Engine::start(context(port)).unwrap();

        handle.connect("", port).unwrap();
        handle.connect("127.0.0.1", 0).unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);

        handle.connect("127.0.0.1", port).unwrap();
        let mut robot = Peer::accept(&listener).await;
        assert!(robot.next_doc().await.contains("<HelloRequest"));

        handle.shutdown().unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn zero_period_disables_the_ticker() {
        assert!(ticker(Duration::ZERO).is_none());
        assert!(ticker(Duration::from_secs(60)).is_some());
    }
}
