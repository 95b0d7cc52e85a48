//! Token usage ledger with cost estimation.
//!
//! The ledger is owned by one batch and written sequentially; callers take
//! snapshots for reporting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::models::raw::TokenUsage;

/// USD price per 1000 tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub prompt_per_1k: Decimal,
    pub completion_per_1k: Decimal,
}

impl ModelPrice {
    pub fn new(prompt_per_1k: Decimal, completion_per_1k: Decimal) -> Self {
        Self {
            prompt_per_1k,
            completion_per_1k,
        }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> Decimal {
        let thousand = Decimal::ONE_THOUSAND;
        Decimal::from(prompt_tokens) * self.prompt_per_1k / thousand
            + Decimal::from(completion_tokens) * self.completion_per_1k / thousand
    }
}

/// Price per model, with a fallback for models not listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub models: BTreeMap<String, ModelPrice>,
    pub fallback: ModelPrice,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            "gpt-4o".to_string(),
            ModelPrice::new(Decimal::new(25, 4), Decimal::new(1, 2)),
        );
        models.insert(
            "gpt-4o-mini".to_string(),
            ModelPrice::new(Decimal::new(15, 5), Decimal::new(6, 4)),
        );
        Self {
            models,
            fallback: ModelPrice::new(Decimal::new(15, 4), Decimal::new(2, 3)),
        }
    }
}

impl PriceTable {
    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.models.get(model).copied().unwrap_or(self.fallback)
    }
}

/// Accumulated usage at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated cost in USD, unrounded.
    pub estimated_cost: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    prices: PriceTable,
    totals: UsageTotals,
}

impl UsageLedger {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            totals: UsageTotals::default(),
        }
    }

    pub fn record(&mut self, usage: &TokenUsage) {
        let cost = self
            .prices
            .price_for(&usage.model)
            .cost(usage.prompt_tokens, usage.completion_tokens);
        self.totals.calls += 1;
        self.totals.prompt_tokens += usage.prompt_tokens;
        self.totals.completion_tokens += usage.completion_tokens;
        self.totals.total_tokens += usage.total_tokens();
        self.totals.estimated_cost += cost;
        debug!(
            "Recorded {} tokens for {} (cost {})",
            usage.total_tokens(),
            usage.model,
            cost
        );
    }

    pub fn record_all<'a>(&mut self, usages: impl IntoIterator<Item = &'a TokenUsage>) {
        for usage in usages {
            self.record(usage);
        }
    }

    pub fn snapshot(&self) -> UsageTotals {
        self.totals.clone()
    }

    pub fn reset(&mut self) {
        self.totals = UsageTotals::default();
    }
}

/// Usage of extraction calls, recorded as each call completes.
///
/// Clones share one buffer, so calls finished before a caller gives up on
/// the whole extraction are still visible to it.
#[derive(Debug, Clone, Default)]
pub struct UsageLog {
    calls: Arc<Mutex<Vec<TokenUsage>>>,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> MutexGuard<'_, Vec<TokenUsage>> {
        // A panicked writer leaves the vector intact
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, usage: TokenUsage) {
        self.calls().push(usage);
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<TokenUsage> {
        std::mem::take(&mut *self.calls())
    }

    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
