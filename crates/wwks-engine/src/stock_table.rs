//! Stock table keyed by article id.
//!
//! Every mutation keeps one invariant: a row at quantity zero is displayed
//! [`DisplayState::Neutral`], whatever colour an order would give it.

use ahash::AHashMap;
use wwks_core::{Article, DisplayState, StockItem};

#[derive(Debug, Default)]
pub struct StockTable {
    rows: AHashMap<String, StockItem>,
}

impl StockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, article_id: &str) -> Option<&StockItem> {
        self.rows.get(article_id)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Insert a reported article or refresh the existing row. An existing row
    /// keeps its display state unless the new quantity is zero.
    pub fn upsert(&mut self, article: &Article) -> &StockItem {
        let row = self
            .rows
            .entry(article.id.clone())
            .and_modify(|row| {
                row.quantity = article.quantity;
                // Targeted probes may omit details; keep what we know.
                if !article.name.is_empty() {
                    row.name = article.name.clone();
                }
                if !article.dosage_form.is_empty() {
                    row.dosage_form = article.dosage_form.clone();
                }
                if !article.packaging_unit.is_empty() {
                    row.packaging_unit = article.packaging_unit.clone();
                }
            })
            .or_insert_with(|| StockItem::from_article(article));
        enforce_depleted(row);
        row
    }

    pub fn set_quantity(&mut self, article_id: &str, quantity: u32) -> Option<&StockItem> {
        let row = self.rows.get_mut(article_id)?;
        row.quantity = quantity;
        enforce_depleted(row);
        Some(&*row)
    }

    pub fn set_display(&mut self, article_id: &str, display: DisplayState) -> Option<&StockItem> {
        let row = self.rows.get_mut(article_id)?;
        row.display = display;
        enforce_depleted(row);
        Some(&*row)
    }

    /// Take `by` packs off a row, never below zero.
    pub fn decrement(&mut self, article_id: &str, by: u32) -> Option<&StockItem> {
        let row = self.rows.get_mut(article_id)?;
        row.quantity = row.quantity.saturating_sub(by);
        enforce_depleted(row);
        Some(&*row)
    }

    /// Rows sorted by article id.
    pub fn snapshot(&self) -> Vec<StockItem> {
        let mut rows: Vec<StockItem> = self.rows.values().cloned().collect();
        rows.sort_by(|a, b| a.article_id.cmp(&b.article_id));
        rows
    }
}

fn enforce_depleted(row: &mut StockItem) {
    if row.quantity == 0 {
        row.display = DisplayState::Neutral;
    }
}
