//! Records owned by the reconciliation engine: stock rows and output orders.

use serde::{Deserialize, Serialize};

use super::enums::{DisplayState, OrderState};
use super::message::Article;

/// One row of the stock table, keyed by `article_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub article_id: String,
    pub name: String,
    pub dosage_form: String,
    pub packaging_unit: String,
    pub quantity: u32,
    pub display: DisplayState,
}

impl StockItem {
    /// New row from a reported article; depleted articles start neutral.
    pub fn from_article(article: &Article) -> Self {
        Self {
            article_id: article.id.clone(),
            name: article.name.clone(),
            dosage_form: article.dosage_form.clone(),
            packaging_unit: article.packaging_unit.clone(),
            quantity: article.quantity,
            display: if article.quantity == 0 {
                DisplayState::Neutral
            } else {
                DisplayState::Purple
            },
        }
    }
}

/// A client-issued output order tracked until it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOrder {
    /// Time-based id of the output request that created the order.
    pub order_id: String,
    pub article_id: String,
    pub requested_quantity: u32,
    pub state: OrderState,
}

impl OutputOrder {
    pub fn new(order_id: String, article_id: String, requested_quantity: u32) -> Self {
        Self {
            order_id,
            article_id,
            requested_quantity,
            state: OrderState::Requested,
        }
    }
}
