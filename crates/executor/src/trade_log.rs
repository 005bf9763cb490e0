use crate::error::ExecutorError;
use core_types::TradeRecord;
use rust_decimal::Decimal;
use serde::Serialize;

/// Append-only history of an account's fills.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TradeLog {
    records: Vec<TradeRecord>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TradeRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    /// The `limit` most recent records, newest first.
    pub fn latest(&self, limit: usize) -> Vec<&TradeRecord> {
        self.records.iter().rev().take(limit).collect()
    }

    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a TradeRecord> + 'a {
        self.records.iter().filter(move |r| r.symbol == symbol)
    }

    pub fn total_fees(&self) -> Decimal {
        self.records.iter().map(|r| r.fee).sum()
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.records.iter().filter_map(|r| r.realized_pnl).sum()
    }

    pub fn realized_pnl_for(&self, symbol: &str) -> Decimal {
        self.for_symbol(symbol).filter_map(|r| r.realized_pnl).sum()
    }

    /// Checks `cash + open_margin + Σ fees - Σ realized_pnl == initial_cash`.
    pub fn verify_conservation(
        &self,
        initial_cash: Decimal,
        cash: Decimal,
        open_margin: Decimal,
    ) -> Result<(), ExecutorError> {
        let actual = cash + open_margin + self.total_fees() - self.total_realized_pnl();
        if actual == initial_cash {
            Ok(())
        } else {
            Err(ExecutorError::ConservationBreach {
                expected: initial_cash,
                actual,
            })
        }
    }
}
