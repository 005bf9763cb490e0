use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use configuration::Simulation;
use core_types::money::{cap_fee, round_money};
use core_types::{
    ExitTrigger, Order, Position, PositionSnapshot, SignalKind, SymbolState, TradeRecord,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The part of an account the execution engine reads and rewrites.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub account_id: Uuid,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    /// Last known price per symbol.
    pub marks: BTreeMap<String, Decimal>,
}

impl Ledger {
    pub fn new(account_id: Uuid, cash: Decimal) -> Self {
        Self {
            account_id,
            cash,
            positions: BTreeMap::new(),
            marks: BTreeMap::new(),
        }
    }

    /// Price a position is valued at: its last mark, or its entry price if never marked.
    pub fn mark_for(&self, position: &Position) -> Decimal {
        self.marks
            .get(&position.symbol)
            .copied()
            .unwrap_or(position.entry_price)
    }

    pub fn margin_in_use(&self) -> Decimal {
        self.positions.values().map(|p| p.margin).sum()
    }

    /// `cash + Σ (margin + unrealized_pnl)` at the current marks.
    pub fn equity(&self) -> Result<Decimal, ExecutorError> {
        let mut equity = self.cash;
        for position in self.positions.values() {
            let value = position
                .market_value(self.mark_for(position))
                .map_err(|e| ExecutorError::failed(&position.symbol, e.to_string()))?;
            equity = equity
                .checked_add(value)
                .ok_or_else(|| ExecutorError::failed(&position.symbol, "equity overflow"))?;
        }
        Ok(equity)
    }

    pub fn position_snapshot(&self, symbol: &str) -> Result<Option<PositionSnapshot>, ExecutorError> {
        self.positions
            .get(symbol)
            .map(|p| {
                p.snapshot(self.mark_for(p))
                    .map_err(|e| ExecutorError::failed(symbol, e.to_string()))
            })
            .transpose()
    }
}

/// The result of applying one order to a ledger. Nothing is committed until the
/// caller swaps `ledger` in.
#[derive(Debug, Clone)]
pub struct Transition {
    pub ledger: Ledger,
    pub record: TradeRecord,
    /// State of the symbol right after the transition.
    pub state: SymbolState,
}

/// The state machine every position change goes through.
///
/// `Flat --open--> Open`, `Open --close/stop/target--> Flat`, and
/// `Open --liquidation--> Liquidated`, after which the symbol rests `Flat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionEngine {
    fee_rate: Decimal,
    maintenance_buffer: Decimal,
}

impl ExecutionEngine {
    pub fn new(params: &Simulation) -> Result<Self, ExecutorError> {
        if params.taker_fee_pct < Decimal::ZERO || params.taker_fee_pct >= Decimal::ONE {
            return Err(ExecutorError::InvalidParameters(format!(
                "taker_fee_pct must be in [0, 1), got {}",
                params.taker_fee_pct
            )));
        }
        if params.maintenance_margin_buffer <= Decimal::ZERO
            || params.maintenance_margin_buffer > Decimal::ONE
        {
            return Err(ExecutorError::InvalidParameters(format!(
                "maintenance_margin_buffer must be in (0, 1], got {}",
                params.maintenance_margin_buffer
            )));
        }
        Ok(Self {
            fee_rate: params.taker_fee_pct,
            maintenance_buffer: params.maintenance_margin_buffer,
        })
    }

    /// A close order for `symbol` at `price`, tagged with the risk rule that forced it.
    pub fn forced_exit(
        &self,
        ledger: &Ledger,
        symbol: &str,
        price: Decimal,
        trigger: ExitTrigger,
    ) -> Result<Order, ExecutorError> {
        let position = ledger
            .positions
            .get(symbol)
            .ok_or_else(|| ExecutorError::failed(symbol, "no open position to force out"))?;
        let snapshot = position
            .snapshot(price)
            .map_err(|e| ExecutorError::failed(symbol, e.to_string()))?;
        Order::close(&snapshot, price, self.fee_rate, Some(trigger))
            .map_err(|e| ExecutorError::failed(symbol, e.to_string()))
    }

    /// Computes the ledger that results from filling `order` at `at`.
    ///
    /// The input ledger is never modified; any violated invariant returns
    /// `ExecutionFailed` and the caller keeps its old state.
    pub fn transition(
        &self,
        ledger: &Ledger,
        order: &Order,
        at: DateTime<Utc>,
    ) -> Result<Transition, ExecutorError> {
        let symbol = order.symbol.as_str();
        check_order(order)?;

        let mut next = ledger.clone();
        let (record_fee, realized_pnl, state) = match order.signal_type {
            SignalKind::BuyToEnter | SignalKind::SellToEnter => {
                if next.positions.contains_key(symbol) {
                    return Err(ExecutorError::failed(symbol, "a position is already open"));
                }
                let margin = order
                    .margin()
                    .map_err(|e| ExecutorError::failed(symbol, e.to_string()))?;
                let cash = next.cash - margin - order.fee_usd;
                if cash.is_sign_negative() {
                    return Err(ExecutorError::failed(
                        symbol,
                        format!(
                            "margin {margin} plus fee {} exceeds cash {}",
                            order.fee_usd, next.cash
                        ),
                    ));
                }
                let exit_plan = order
                    .exit_plan
                    .clone()
                    .ok_or_else(|| ExecutorError::failed(symbol, "entry order has no exit plan"))?;
                let liquidation_price = Position::liquidation_price_for(
                    order.side,
                    order.price_used,
                    order.leverage,
                    self.maintenance_buffer,
                )
                .map_err(|e| ExecutorError::failed(symbol, e.to_string()))?;

                next.cash = cash;
                next.positions.insert(
                    symbol.to_string(),
                    Position {
                        position_id: Uuid::new_v4(),
                        account_id: ledger.account_id,
                        symbol: symbol.to_string(),
                        side: order.side,
                        quantity: order.quantity,
                        entry_price: order.price_used,
                        leverage: order.leverage,
                        margin,
                        liquidation_price,
                        exit_plan,
                        confidence: order.confidence,
                        opened_at: at,
                    },
                );
                (order.fee_usd, None, SymbolState::Open)
            }
            SignalKind::Close => {
                let position = next
                    .positions
                    .remove(symbol)
                    .ok_or_else(|| ExecutorError::failed(symbol, "no open position to close"))?;
                if position.side != order.side || position.quantity != order.quantity {
                    return Err(ExecutorError::failed(
                        symbol,
                        format!(
                            "close of {} {} does not match open {} {}",
                            order.quantity, order.side, position.quantity, position.side
                        ),
                    ));
                }
                let pnl = position
                    .unrealized_pnl(order.price_used)
                    .map_err(|e| ExecutorError::failed(symbol, e.to_string()))?;
                let proceeds = position.margin + pnl;
                let fee = cap_fee(order.fee_usd, proceeds);
                next.cash = round_money(next.cash + proceeds - fee);
                if next.cash.is_sign_negative() {
                    return Err(ExecutorError::failed(symbol, "close would leave negative cash"));
                }
                let state = match order.trigger {
                    Some(ExitTrigger::Liquidation) => SymbolState::Liquidated,
                    _ => SymbolState::Flat,
                };
                (fee, Some(pnl), state)
            }
            SignalKind::Hold => {
                return Err(ExecutorError::failed(symbol, "hold signals carry no order"));
            }
        };
        next.marks.insert(symbol.to_string(), order.price_used);

        let action = order
            .action()
            .ok_or_else(|| ExecutorError::failed(symbol, "order has no trade action"))?;
        let record = TradeRecord {
            trade_id: Uuid::new_v4(),
            account_id: ledger.account_id,
            symbol: symbol.to_string(),
            action,
            side: order.side,
            quantity: order.quantity,
            price: order.price_used,
            leverage: order.leverage,
            notional: order.notional_usd,
            fee: record_fee,
            realized_pnl,
            resulting_cash: next.cash,
            resulting_equity: next.equity()?,
            timestamp: at,
        };
        Ok(Transition {
            ledger: next,
            record,
            state,
        })
    }
}

fn check_order(order: &Order) -> Result<(), ExecutorError> {
    let symbol = order.symbol.as_str();
    if order.quantity <= Decimal::ZERO {
        return Err(ExecutorError::failed(symbol, "quantity must be positive"));
    }
    if order.price_used <= Decimal::ZERO {
        return Err(ExecutorError::failed(symbol, "price must be positive"));
    }
    if order.leverage < Decimal::ONE {
        return Err(ExecutorError::failed(symbol, "leverage must be at least 1"));
    }
    if order.fee_usd.is_sign_negative() {
        return Err(ExecutorError::failed(symbol, "fee must not be negative"));
    }
    if order
        .signal_type
        .entry_side()
        .is_some_and(|side| side != order.side)
    {
        return Err(ExecutorError::failed(
            symbol,
            format!("{} order cannot open a {} position", order.signal_type, order.side),
        ));
    }
    if order.quantity.checked_mul(order.price_used) != Some(order.notional_usd) {
        return Err(ExecutorError::failed(symbol, "notional does not equal quantity times price"));
    }
    Ok(())
}
