//! Reconciliation of inbound robot messages against stock and orders.
//!
//! [`Reconciler`] owns the stock table and the order book and is the only
//! writer of both. It performs no I/O: every reaction returns [`Effects`],
//! the requests to send and the events to publish, which the engine task
//! carries out in order.

use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wwks_core::correlation::{self, ParsedId};
use wwks_core::error::{Result, WwksError};
use wwks_core::request::RequestFactory;
use wwks_core::{
    ConnectionState, DisplayState, Envelope, HelloResponse, InputMessage, MessageKind, OrderState,
    OutputMessage, OutputOrder, OutputResponse, Request, StatusResponse, StockInfoResponse,
    TaskInfoResponse, Trigger, codec,
};

use crate::event::EngineEvent;
use crate::order_book::{OrderBook, Transition};
use crate::stock_table::StockTable;

/// Robot status text before any `StatusResponse` arrived.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Component type carrying the robot number and readiness.
const STORAGE_SYSTEM: &str = "StorageSystem";

/// Requests to send and events to publish, in order.
#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    pub outbound: Vec<Request>,
    pub events: Vec<EngineEvent>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }

    fn send(&mut self, request: Request) {
        self.outbound.push(request);
    }

    fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }
}

/// Result of an output intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputIntent {
    /// A new order was created with this id.
    Created(String),
    /// The article already had an open order; its status was queried instead.
    Redirected(String),
}

pub struct Reconciler {
    factory: Arc<RequestFactory>,
    stock: StockTable,
    orders: OrderBook,
    /// Id of the outstanding full refresh, whose response replaces the table.
    pending_full_refresh: Option<String>,
    probe_filter: String,
    connection: ConnectionState,
    status_text: String,
}

impl Reconciler {
    pub fn new(factory: Arc<RequestFactory>, probe_filter: impl Into<String>) -> Self {
        Self {
            factory,
            stock: StockTable::new(),
            orders: OrderBook::new(),
            pending_full_refresh: None,
            probe_filter: probe_filter.into(),
            connection: ConnectionState::Disconnected,
            status_text: UNKNOWN_STATUS.into(),
        }
    }

    pub fn stock(&self) -> &StockTable {
        &self.stock
    }

    pub fn orders(&self) -> &OrderBook {
        &self.orders
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    // -----------------------------------------------------------------------
    // Intents
    // -----------------------------------------------------------------------

    /// Full stock query; its response replaces the whole table.
    pub fn full_refresh(&mut self) -> Effects {
        let request = self.factory.full_stock();
        self.pending_full_refresh = Some(request.id().to_string());
        Effects {
            outbound: vec![request],
            events: Vec::new(),
        }
    }

    /// Targeted stock query for one article (search, stock input).
    pub fn probe_article(&mut self, article_id: &str) -> Effects {
        let mut fx = Effects::default();
        self.push_probe(&mut fx, None, article_id);
        fx
    }

    /// Ask the robot to dispense `quantity` packs of `article_id`.
    pub fn request_output(
        &mut self,
        article_id: &str,
        quantity: u32,
        priority: &str,
        destination: &str,
        now: Instant,
    ) -> Result<(OutputIntent, Effects)> {
        if article_id.trim().is_empty() {
            return Err(WwksError::Engine("output request without article id".into()));
        }
        if quantity == 0 {
            return Err(WwksError::Engine(format!(
                "output request for {article_id} with quantity 0"
            )));
        }
        if self.connection != ConnectionState::Connected {
            return Err(WwksError::Engine(format!(
                "robot link is {}, output not sent",
                self.connection
            )));
        }

        let mut fx = Effects::default();
        if let Some(open) = self.orders.open_for_article(article_id) {
            let order_id = open.order_id.clone();
            info!(
                "[reconcile] {article_id} already has open order {order_id} ({}), querying it",
                open.state
            );
            fx.send(self.factory.task_info(&order_id));
            return Ok((OutputIntent::Redirected(order_id), fx));
        }

        let request = self.factory.output(article_id, quantity, priority, destination);
        let order = OutputOrder::new(request.id().to_string(), article_id.to_string(), quantity);
        let order_id = order.order_id.clone();
        if let Err(order) = self.orders.insert(order, now) {
            return Err(WwksError::Engine(format!("order id {} already tracked", order.order_id)));
        }
        info!("[reconcile] output {order_id}: {quantity} x {article_id}");

        fx.send(request);
        fx.emit(EngineEvent::OrderChanged {
            order_id: order_id.clone(),
            article_id: article_id.to_string(),
            state: OrderState::Requested,
        });
        self.paint(&mut fx, article_id, OrderState::Requested.display());
        Ok((OutputIntent::Created(order_id), fx))
    }

    /// Re-query orders the robot has left unanswered for `max_age`.
    pub fn follow_up(&mut self, now: Instant, max_age: Duration) -> Effects {
        let mut fx = Effects::default();
        for order_id in self.orders.take_stale(now, max_age) {
            debug!("[reconcile] order {order_id} unanswered for {max_age:?}, querying");
            fx.send(self.factory.task_info(&order_id));
        }
        fx
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    pub fn on_link_state(&mut self, state: ConnectionState) -> Effects {
        self.connection = state;
        if state != ConnectionState::Connected {
            self.pending_full_refresh = None;
        }
        let mut fx = Effects::default();
        fx.emit(self.connectivity());
        fx
    }

    /// React to one classified frame. Undecodable frames are logged and dropped.
    pub fn on_frame(&mut self, kind: MessageKind, xml: &str) -> Effects {
        let envelope = match codec::decode(xml) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("[reconcile] dropping {kind}: {e}");
                return Effects::default();
            }
        };
        self.on_envelope(kind, envelope)
    }

    pub fn on_envelope(&mut self, kind: MessageKind, envelope: Envelope) -> Effects {
        let Envelope {
            hello_response,
            status_response,
            stock_info_response,
            output_response,
            output_message,
            input_message,
            task_info_response,
            ..
        } = envelope;

        let fx = match kind {
            MessageKind::HelloResponse => hello_response.map(|m| self.on_hello(&m)),
            MessageKind::StatusResponse => status_response.map(|m| self.on_status(&m)),
            MessageKind::StockInfoResponse => stock_info_response.map(|m| self.on_stock_info(&m)),
            MessageKind::OutputResponse => output_response.map(|m| self.on_output_response(&m)),
            MessageKind::OutputMessage => output_message.map(|m| self.on_output_message(&m)),
            MessageKind::InputMessage => input_message.map(|m| self.on_input_message(&m)),
            MessageKind::TaskInfoResponse => task_info_response.map(|m| self.on_task_info(&m)),
            MessageKind::KeepAliveRequest | MessageKind::Unknown => Some(Effects::default()),
        };
        fx.unwrap_or_else(|| {
            warn!("[reconcile] {kind} frame without a {kind} element");
            Effects::default()
        })
    }

    fn on_hello(&mut self, hello: &HelloResponse) -> Effects {
        info!("[reconcile] hello accepted (id={})", hello.id);
        let mut fx = self.full_refresh();
        fx.outbound.insert(0, self.factory.status());
        fx
    }

    fn on_status(&mut self, status: &StatusResponse) -> Effects {
        let text = robot_status_text(status);
        let mut fx = Effects::default();
        if text != self.status_text {
            info!("[reconcile] robot status: {text}");
            self.status_text = text;
            fx.emit(self.connectivity());
        }
        fx
    }

    fn on_stock_info(&mut self, response: &StockInfoResponse) -> Effects {
        let mut fx = Effects::default();
        let parsed = correlation::decode(&response.id);
        if let ParsedId::Malformed { .. } = parsed {
            warn!("[reconcile] stock response with malformed id '{}' ignored", response.id);
            return fx;
        }
        let base = parsed.base();
        let reference = parsed.article();

        let full = reference.is_none() && self.pending_full_refresh.as_deref() == Some(base);
        if full {
            self.pending_full_refresh = None;
            self.stock.clear();
            info!("[reconcile] full refresh: {} article(s)", response.articles.len());
        }

        let mut touched: Vec<String> = Vec::new();
        let reported = |id: &str| response.articles.iter().any(|a| a.id == id);

        let order_article = self.order_for_probe(base, reference).map(|o| o.article_id.clone());
        if let Some(article_id) = order_article {
            // Authoritative quantity for the order's article; empty means none left.
            if !reported(&article_id) {
                debug!("[reconcile] {article_id} absent from probe {}, quantity 0", response.id);
                self.stock.set_quantity(&article_id, 0);
            }
            touched.push(article_id);
        } else if let Some(article_id) = reference {
            self.stock.set_display(article_id, DisplayState::Neutral);
            if !reported(article_id) {
                self.stock.set_quantity(article_id, 0);
            }
            touched.push(article_id.to_string());
        }

        for article in &response.articles {
            if article.id.is_empty() {
                continue;
            }
            self.stock.upsert(article);
            touched.push(article.id.clone());
        }

        if full {
            let open: Vec<OutputOrder> = self.orders.snapshot();
            for order in open {
                self.stock.set_display(&order.article_id, order.state.display());
            }
        }

        let mut seen = ahash::AHashSet::new();
        for article_id in touched {
            if seen.insert(article_id.clone()) {
                self.emit_article(&mut fx, &article_id);
            }
        }
        fx
    }

    fn on_output_response(&mut self, response: &OutputResponse) -> Effects {
        let mut fx = Effects::default();
        let Ok(next) = response.status().parse::<OrderState>() else {
            debug!(
                "[reconcile] output response {} with status '{}' ignored",
                response.id,
                response.status()
            );
            return fx;
        };
        match self.orders.transition(&response.id, Trigger::OutputResponse, next) {
            Transition::Applied(order) => self.settle(&mut fx, order, Trigger::OutputResponse),
            other => self.log_unapplied(&response.id, next, other),
        }
        fx
    }

    fn on_output_message(&mut self, message: &OutputMessage) -> Effects {
        let mut fx = Effects::default();
        if self.orders.get(&message.id).is_none() {
            // Output started elsewhere; refresh the article if we care about it.
            let article_id = message.article_id();
            if !article_id.is_empty() && self.wants_probe(article_id) {
                debug!("[reconcile] foreign output {} for {article_id}, probing", message.id);
                self.push_probe(&mut fx, None, article_id);
            }
            return fx;
        }

        let next = match message.status() {
            "Incomplete" => OrderState::Incomplete,
            "Completed" => OrderState::Completed,
            other => {
                debug!(
                    "[reconcile] output message {} status '{other}' treated as completed",
                    message.id
                );
                OrderState::Completed
            }
        };
        match self.orders.transition(&message.id, Trigger::OutputMessage, next) {
            Transition::Applied(order) => {
                let delivered: u32 = message
                    .articles
                    .iter()
                    .filter(|a| a.id == order.article_id)
                    .map(|a| a.packs.len() as u32)
                    .sum();
                if next == OrderState::Completed && delivered > 0 {
                    self.complete(&mut fx, order, delivered);
                } else {
                    self.settle(&mut fx, order, Trigger::OutputMessage);
                }
            }
            Transition::Refused { current } => {
                warn!(
                    "[reconcile] order {} is {current}, output message {next} refused, querying",
                    message.id
                );
                fx.send(self.factory.task_info(&message.id));
            }
            other => self.log_unapplied(&message.id, next, other),
        }
        fx
    }

    fn on_input_message(&mut self, message: &InputMessage) -> Effects {
        let mut fx = Effects::default();
        for article in &message.articles {
            let known = self.stock.get(&article.id).is_some();
            if !article.id.is_empty() && (known || self.wants_probe(&article.id)) {
                debug!("[reconcile] stock input for {}, probing", article.id);
                self.push_probe(&mut fx, None, &article.id);
            }
        }
        fx
    }

    fn on_task_info(&mut self, response: &TaskInfoResponse) -> Effects {
        let mut fx = Effects::default();
        let Some(task) = &response.task else {
            debug!("[reconcile] task info {} without task", response.id);
            return fx;
        };
        let Ok(next) = task.status.parse::<OrderState>() else {
            debug!("[reconcile] task {} with status '{}' ignored", task.id, task.status);
            return fx;
        };
        match self.orders.transition(&task.id, Trigger::TaskInfoResponse, next) {
            Transition::Applied(order) => self.settle(&mut fx, order, Trigger::TaskInfoResponse),
            other => self.log_unapplied(&task.id, next, other),
        }
        fx
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Apply the stock and order-book consequences of an accepted transition.
    fn settle(&mut self, fx: &mut Effects, order: OutputOrder, via: Trigger) {
        match order.state {
            OrderState::Completed => {
                let requested = order.requested_quantity;
                self.complete(fx, order, requested);
            }
            OrderState::Incomplete => {
                fx.emit(order_event(&order));
                self.paint(fx, &order.article_id, DisplayState::Red);
                // The order id as probe base lets the response find the order.
                if via == Trigger::TaskInfoResponse {
                    self.orders.remove(&order.order_id);
                }
                self.push_probe(fx, Some(&order.order_id), &order.article_id);
            }
            state if state.is_terminal() => {
                self.orders.remove(&order.order_id);
                fx.emit(order_event(&order));
                self.paint(fx, &order.article_id, state.display());
            }
            state => {
                fx.emit(order_event(&order));
                self.paint(fx, &order.article_id, state.display());
            }
        }
    }

    fn complete(&mut self, fx: &mut Effects, order: OutputOrder, delivered: u32) {
        self.orders.remove(&order.order_id);
        info!("[reconcile] order {} completed: {delivered} x {}", order.order_id, order.article_id);
        fx.emit(order_event(&order));
        self.stock.decrement(&order.article_id, delivered);
        self.paint(fx, &order.article_id, DisplayState::Green);
    }

    /// Recolour a row and report it. Rows we do not know stay unknown.
    fn paint(&mut self, fx: &mut Effects, article_id: &str, display: DisplayState) {
        if self.stock.set_display(article_id, display).is_some() {
            self.emit_article(fx, article_id);
        }
    }

    fn emit_article(&self, fx: &mut Effects, article_id: &str) {
        if let Some(row) = self.stock.get(article_id) {
            fx.emit(EngineEvent::ArticleChanged {
                article_id: row.article_id.clone(),
                quantity: row.quantity,
                display: row.display,
            });
        }
    }

    fn push_probe(&self, fx: &mut Effects, base: Option<&str>, article_id: &str) {
        match self.factory.probe(base, article_id) {
            Ok(request) => fx.send(request),
            Err(e) => warn!("[reconcile] cannot probe {article_id}: {e}"),
        }
    }

    /// Order a stock response refers to: by order id, else by article.
    fn order_for_probe(&self, base: &str, reference: Option<&str>) -> Option<&OutputOrder> {
        self.orders
            .get(base)
            .or_else(|| reference.and_then(|a| self.orders.open_for_article(a)))
            .or_else(|| self.orders.open_for_article(base))
    }

    fn wants_probe(&self, article_id: &str) -> bool {
        self.probe_filter.is_empty() || article_id.contains(self.probe_filter.as_str())
    }

    fn connectivity(&self) -> EngineEvent {
        EngineEvent::ConnectivityChanged {
            state: self.connection,
            status_text: self.status_text.clone(),
        }
    }

    fn log_unapplied(&self, order_id: &str, next: OrderState, outcome: Transition) {
        match outcome {
            Transition::Missing => {
                debug!("[reconcile] {next} for untracked order {order_id} ignored")
            }
            Transition::Unchanged => debug!("[reconcile] order {order_id} already {next}"),
            Transition::Refused { current } => {
                warn!("[reconcile] order {order_id}: {current} -> {next} refused")
            }
            Transition::Applied(_) => {}
        }
    }
}

fn order_event(order: &OutputOrder) -> EngineEvent {
    EngineEvent::OrderChanged {
        order_id: order.order_id.clone(),
        article_id: order.article_id.clone(),
        state: order.state,
    }
}

/// `ROB<n> [Ready]` / `ROB<n> [Inactive]` from the storage-system component,
/// where `n` is the last word of its description.
pub fn robot_status_text(status: &StatusResponse) -> String {
    let readiness = |state: &str| if state == "Ready" { "Ready" } else { "Inactive" };
    match status.components.iter().find(|c| c.kind == STORAGE_SYSTEM) {
        Some(component) => {
            let number = component
                .description
                .split_whitespace()
                .last()
                .unwrap_or("0");
            format!("ROB{number} [{}]", readiness(&component.state))
        }
        None if !status.state.is_empty() => format!("Robot [{}]", readiness(&status.state)),
        None => UNKNOWN_STATUS.into(),
    }
}
