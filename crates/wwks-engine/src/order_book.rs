//! In-flight output orders, at most one per article.

use ahash::AHashMap;
use tokio::time::{Duration, Instant};
use wwks_core::{OrderState, OutputOrder, Trigger};

#[derive(Debug)]
struct Tracked {
    order: OutputOrder,
    /// Creation time, moved forward on every follow-up query.
    touched: Instant,
}

/// Outcome of feeding a status to [`OrderBook::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The order moved; carries the updated order.
    Applied(OutputOrder),
    /// Status equals the current one.
    Unchanged,
    /// The state machine does not allow this move.
    Refused { current: OrderState },
    /// No order with that id is tracked.
    Missing,
}

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: AHashMap<String, Tracked>,
    by_article: AHashMap<String, String>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&OutputOrder> {
        self.orders.get(order_id).map(|t| &t.order)
    }

    /// The open order for `article_id`, if any.
    pub fn open_for_article(&self, article_id: &str) -> Option<&OutputOrder> {
        self.by_article.get(article_id).and_then(|id| self.get(id))
    }

    /// Track a new order. Refused (returning the order back) when the article
    /// already has an open order or the id is taken.
    pub fn insert(&mut self, order: OutputOrder, now: Instant) -> Result<(), OutputOrder> {
        let article_busy = self.by_article.contains_key(&order.article_id);
        if article_busy || self.orders.contains_key(&order.order_id) {
            return Err(order);
        }
        self.by_article.insert(order.article_id.clone(), order.order_id.clone());
        self.orders.insert(
            order.order_id.clone(),
            Tracked {
                order,
                touched: now,
            },
        );
        Ok(())
    }

    /// Move an order to `next` if the state machine allows it.
    pub fn transition(&mut self, order_id: &str, via: Trigger, next: OrderState) -> Transition {
        let Some(tracked) = self.orders.get_mut(order_id) else {
            return Transition::Missing;
        };
        let current = tracked.order.state;
        if current == next {
            return Transition::Unchanged;
        }
        if !current.accepts(via, next) {
            return Transition::Refused { current };
        }
        tracked.order.state = next;
        Transition::Applied(tracked.order.clone())
    }

    /// Stop tracking an order. Removing an unknown id is a no-op.
    pub fn remove(&mut self, order_id: &str) -> Option<OutputOrder> {
        let tracked = self.orders.remove(order_id)?;
        if self.by_article.get(&tracked.order.article_id).is_some_and(|id| id == order_id) {
            self.by_article.remove(&tracked.order.article_id);
        }
        Some(tracked.order)
    }

    /// Orders still waiting for the robot (`Requested`/`Queued`) whose last
    /// touch is at least `max_age` old. Their touch time is reset to `now`.
    pub fn take_stale(&mut self, now: Instant, max_age: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .orders
            .values_mut()
            .filter(|t| matches!(t.order.state, OrderState::Requested | OrderState::Queued))
            .filter(|t| now.saturating_duration_since(t.touched) >= max_age)
            .map(|t| {
                t.touched = now;
                t.order.order_id.clone()
            })
            .collect();
        stale.sort();
        stale
    }

    /// Orders sorted by id.
    pub fn snapshot(&self) -> Vec<OutputOrder> {
        let mut orders: Vec<OutputOrder> = self
            .orders
            .values()
            .map(|t| t.order.clone())
            .collect();
        orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        orders
    }
}
