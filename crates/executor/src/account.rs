use crate::engine::{ExecutionEngine, Ledger, Transition};
use crate::error::ExecutorError;
use crate::trade_log::TradeLog;
use chrono::{DateTime, Utc};
use core_types::{
    AccountSnapshot, MarketSnapshot, Order, Position, PositionSnapshot, SymbolState, TradeRecord,
};
use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

/// What a single applied order produced.
#[derive(Debug, Clone)]
pub struct Applied {
    pub snapshot: AccountSnapshot,
    /// The position after the order, `None` once it is closed.
    pub position_snapshot: Option<PositionSnapshot>,
    pub record: TradeRecord,
    pub state: SymbolState,
}

/// What a mark-to-market pass did.
#[derive(Debug, Clone)]
pub struct MarkReport {
    pub snapshot: AccountSnapshot,
    /// Records of positions forced flat by a risk rule, in symbol order.
    pub closed: Vec<TradeRecord>,
    /// Open symbols the price map had no usable price for.
    pub unpriced: Vec<String>,
}

/// A simulated trading account: cash, open positions and the history that produced them.
///
/// Every change goes through [`ExecutionEngine::transition`] and is committed only
/// after the transition succeeds, so a failed order leaves the account as it was.
#[derive(Debug, Clone)]
pub struct Account {
    id: Uuid,
    base_currency: String,
    initial_cash: Decimal,
    ledger: Ledger,
    trades: TradeLog,
    engine: ExecutionEngine,
    archived: bool,
    as_of: Option<DateTime<Utc>>,
}

impl Account {
    /// Creates a new `Account` funded with `initial_cash`.
    pub fn new(
        id: Uuid,
        base_currency: &str,
        initial_cash: Decimal,
        engine: ExecutionEngine,
    ) -> Result<Self, ExecutorError> {
        if initial_cash.is_sign_negative() {
            return Err(ExecutorError::InvalidParameters(format!(
                "initial cash must not be negative, got {initial_cash}"
            )));
        }
        Ok(Self {
            id,
            base_currency: base_currency.to_string(),
            initial_cash,
            ledger: Ledger::new(id, initial_cash),
            trades: TradeLog::new(),
            engine,
            archived: false,
            as_of: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    pub fn cash_available(&self) -> Decimal {
        self.ledger.cash
    }

    pub fn margin_in_use(&self) -> Decimal {
        self.ledger.margin_in_use()
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// Timestamp of the most recent snapshot this account processed.
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.as_of
    }

    pub fn trades(&self) -> &TradeLog {
        &self.trades
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.ledger.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.ledger.positions.values()
    }

    pub fn position_snapshot(&self, symbol: &str) -> Result<Option<PositionSnapshot>, ExecutorError> {
        self.ledger.position_snapshot(symbol)
    }

    pub fn symbol_state(&self, symbol: &str) -> SymbolState {
        if self.ledger.positions.contains_key(symbol) {
            SymbolState::Open
        } else {
            SymbolState::Flat
        }
    }

    pub fn equity(&self) -> Result<Decimal, ExecutorError> {
        self.ledger.equity()
    }

    pub fn snapshot(&self) -> Result<AccountSnapshot, ExecutorError> {
        let positions = self
            .ledger
            .positions
            .keys()
            .filter_map(|symbol| self.ledger.position_snapshot(symbol).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AccountSnapshot {
            account_id: self.id,
            base_currency: self.base_currency.clone(),
            initial_cash: self.initial_cash,
            cash_available: self.ledger.cash,
            margin_in_use: self.ledger.margin_in_use(),
            equity: self.ledger.equity()?,
            realized_pnl: self.trades.total_realized_pnl(),
            total_fees: self.trades.total_fees(),
            positions,
            archived: self.archived,
            as_of: self.as_of,
        })
    }

    /// Marks the account archived. Archived accounts refuse every later change.
    pub fn archive(&mut self) {
        self.archived = true;
    }

    /// Fills `order` at its `price_used`.
    pub fn apply(&mut self, order: &Order, at: DateTime<Utc>) -> Result<Applied, ExecutorError> {
        self.ensure_active()?;
        let transition = self
            .engine
            .transition(&self.ledger, order, at)
            .inspect_err(|e| error!(account = %self.id, error = %e, "Order execution failed"))?;
        let state = transition.state;
        let record = self.commit(transition);
        self.observe(at);

        info!(
            account = %self.id,
            symbol = %record.symbol,
            action = %record.action,
            quantity = %record.quantity,
            price = %record.price,
            fee = %record.fee,
            cash = %record.resulting_cash,
            "Order executed"
        );

        Ok(Applied {
            snapshot: self.snapshot()?,
            position_snapshot: self.ledger.position_snapshot(&record.symbol)?,
            record,
            state,
        })
    }

    /// Revalues open positions at the snapshot's prices and forces out any position
    /// whose liquidation price, stop loss or profit target the new price breaches.
    ///
    /// Positions without a positive price in the snapshot keep their last mark and are
    /// reported in [`MarkReport::unpriced`]. Either every forced exit commits or none do.
    pub fn mark_to_market(&mut self, market: &MarketSnapshot) -> Result<MarkReport, ExecutorError> {
        self.ensure_active()?;
        let at = market.as_of;

        let mut working = self.ledger.clone();
        let mut closed = Vec::new();
        let mut unpriced = Vec::new();

        let symbols: Vec<String> = working.positions.keys().cloned().collect();
        for symbol in symbols {
            let price = match market.price(&symbol) {
                Some(price) if price > Decimal::ZERO => price,
                _ => {
                    unpriced.push(symbol);
                    continue;
                }
            };
            working.marks.insert(symbol.clone(), price);

            let trigger = working
                .positions
                .get(&symbol)
                .and_then(|position| position.breached_trigger(price));
            if let Some(trigger) = trigger {
                let order = self.engine.forced_exit(&working, &symbol, price, trigger)?;
                let transition = self
                    .engine
                    .transition(&working, &order, at)
                    .inspect_err(|e| error!(account = %self.id, error = %e, "Forced exit failed"))?;
                info!(
                    account = %self.id,
                    %symbol,
                    %price,
                    action = %transition.record.action,
                    realized_pnl = ?transition.record.realized_pnl,
                    "Position forced flat"
                );
                working = transition.ledger;
                closed.push(transition.record);
            }
        }

        self.ledger = working;
        for record in &closed {
            self.trades.append(record.clone());
        }
        self.observe(at);

        Ok(MarkReport {
            snapshot: self.snapshot()?,
            closed,
            unpriced,
        })
    }

    fn ensure_active(&self) -> Result<(), ExecutorError> {
        if self.archived {
            return Err(ExecutorError::AccountArchived(self.id));
        }
        Ok(())
    }

    fn commit(&mut self, transition: Transition) -> TradeRecord {
        self.ledger = transition.ledger;
        self.trades.append(transition.record.clone());
        transition.record
    }

    fn observe(&mut self, at: DateTime<Utc>) {
        self.as_of = Some(self.as_of.map_or(at, |seen| seen.max(at)));
    }
}
