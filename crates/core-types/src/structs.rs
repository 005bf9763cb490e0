use crate::enums::{ExitTrigger, PositionSide, SignalKind, TradeAction};
use crate::error::CoreError;
use crate::money::{self, round_money};
use crate::signal::ExitPlan;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Prices the caller observed at one instant. The engine never fetches prices itself.
///
/// Symbols are matched case-insensitively: keys are uppercased on deserialization
/// and by [`MarketSnapshot::with_price`], and [`MarketSnapshot::price`] falls back to
/// an ASCII case-insensitive match for maps built by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of: DateTime<Utc>,
    #[serde(default, deserialize_with = "uppercase_keys")]
    pub prices: HashMap<String, Decimal>,
}

fn uppercase_keys<'de, D>(deserializer: D) -> Result<HashMap<String, Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, Decimal>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(symbol, price)| (symbol.trim().to_ascii_uppercase(), price))
        .collect())
}

impl MarketSnapshot {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            prices: HashMap::new(),
        }
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_ascii_uppercase(), price);
        self
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices
            .get(symbol)
            .or_else(|| {
                self.prices
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(symbol))
                    .map(|(_, price)| price)
            })
            .copied()
    }
}

/// A validated, priced and sized instruction, ready for the execution engine.
///
/// Orders are only built through [`Order::open`] and [`Order::close`], which keep
/// `notional_usd == quantity * price_used` and derive the fee from the notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub signal_type: SignalKind,
    pub symbol: String,
    /// Side of the position being opened or closed.
    pub side: PositionSide,
    pub quantity: Decimal,
    pub leverage: Decimal,
    pub notional_usd: Decimal,
    pub fee_usd: Decimal,
    pub price_used: Decimal,
    pub exit_plan: Option<ExitPlan>,
    pub confidence: Decimal,
    /// Set when a risk rule, not the agent, closes the position.
    pub trigger: Option<ExitTrigger>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
        leverage: Decimal,
        price: Decimal,
        fee_rate: Decimal,
        exit_plan: ExitPlan,
        confidence: Decimal,
    ) -> Result<Self, CoreError> {
        let notional = money::mul(quantity, price, "notional")?;
        let signal_type = match side {
            PositionSide::Long => SignalKind::BuyToEnter,
            PositionSide::Short => SignalKind::SellToEnter,
        };
        Ok(Self {
            signal_type,
            symbol: symbol.to_string(),
            side,
            quantity,
            leverage,
            notional_usd: notional,
            fee_usd: money::fee_for(notional, fee_rate)?,
            price_used: price,
            exit_plan: Some(exit_plan),
            confidence,
            trigger: None,
        })
    }

    /// A full close of `position` at `price`. No partial exits are representable.
    pub fn close(
        position: &PositionSnapshot,
        price: Decimal,
        fee_rate: Decimal,
        trigger: Option<ExitTrigger>,
    ) -> Result<Self, CoreError> {
        let notional = money::mul(position.quantity, price, "notional")?;
        Ok(Self {
            signal_type: SignalKind::Close,
            symbol: position.symbol.clone(),
            side: position.side,
            quantity: position.quantity,
            leverage: position.leverage,
            notional_usd: notional,
            fee_usd: money::fee_for(notional, fee_rate)?,
            price_used: price,
            exit_plan: None,
            confidence: position.confidence,
            trigger,
        })
    }

    /// Cash posted to open this order: `notional / leverage`, rounded half-even.
    pub fn margin(&self) -> Result<Decimal, CoreError> {
        money::div(self.notional_usd, self.leverage, "margin").map(round_money)
    }

    /// The trade action this order records, or `None` for a hold.
    pub fn action(&self) -> Option<TradeAction> {
        if let Some(trigger) = self.trigger {
            return Some(trigger.into());
        }
        match self.signal_type {
            SignalKind::BuyToEnter => Some(TradeAction::BuyToEnter),
            SignalKind::SellToEnter => Some(TradeAction::SellToEnter),
            SignalKind::Close => Some(TradeAction::Close),
            SignalKind::Hold => None,
        }
    }
}

/// An open, leveraged exposure to one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub account_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    /// Cash posted when the position was opened; returned on close.
    pub margin: Decimal,
    pub liquidation_price: Decimal,
    pub exit_plan: ExitPlan,
    pub confidence: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Price at which the leverage-scaled loss consumes `buffer` of the posted margin.
    ///
    /// PnL is scaled by leverage on top of a leveraged quantity, so margin
    /// (`notional / leverage`) is exhausted after a relative move of `1 / leverage²`.
    pub fn liquidation_price_for(
        side: PositionSide,
        entry_price: Decimal,
        leverage: Decimal,
        buffer: Decimal,
    ) -> Result<Decimal, CoreError> {
        let leverage_sq = money::mul(leverage, leverage, "liquidation price")?;
        let distance = money::div(buffer, leverage_sq, "liquidation price")?;
        let factor = match side {
            PositionSide::Long => Decimal::ONE - distance,
            PositionSide::Short => Decimal::ONE + distance,
        };
        let price = money::mul(entry_price, factor, "liquidation price")?;
        Ok(round_money(price.max(Decimal::ZERO)))
    }

    /// `(price - entry) * quantity * side_sign * leverage`, rounded half-even, without the margin floor.
    pub fn gross_pnl(&self, price: Decimal) -> Result<Decimal, CoreError> {
        let move_per_unit = (price - self.entry_price) * self.side.sign();
        let exposure = money::mul(self.quantity, self.leverage, "pnl")?;
        money::mul(move_per_unit, exposure, "pnl").map(round_money)
    }

    /// PnL at `price`, floored at losing the posted margin.
    pub fn unrealized_pnl(&self, price: Decimal) -> Result<Decimal, CoreError> {
        Ok(self.gross_pnl(price)?.max(-self.margin))
    }

    /// What the position is worth to the account at `price`: margin plus PnL.
    pub fn market_value(&self, price: Decimal) -> Result<Decimal, CoreError> {
        Ok(self.margin + self.unrealized_pnl(price)?)
    }

    /// Relative distance from `price` to the liquidation price; positive while safe.
    pub fn liquidation_distance(&self, price: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return None;
        }
        let gap = match self.side {
            PositionSide::Long => price - self.liquidation_price,
            PositionSide::Short => self.liquidation_price - price,
        };
        gap.checked_div(price)
    }

    /// The risk rule `price` breaches, if any. Liquidation takes precedence over the
    /// stop, and the stop over the target.
    pub fn breached_trigger(&self, price: Decimal) -> Option<ExitTrigger> {
        let plan = &self.exit_plan;
        let (liquidated, stopped, target_hit) = match self.side {
            PositionSide::Long => (
                price <= self.liquidation_price,
                price <= plan.stop_loss,
                price >= plan.profit_target,
            ),
            PositionSide::Short => (
                price >= self.liquidation_price,
                price >= plan.stop_loss,
                price <= plan.profit_target,
            ),
        };
        if liquidated {
            Some(ExitTrigger::Liquidation)
        } else if stopped {
            Some(ExitTrigger::StopLoss)
        } else if target_hit {
            Some(ExitTrigger::TakeProfit)
        } else {
            None
        }
    }

    pub fn snapshot(&self, mark_price: Decimal) -> Result<PositionSnapshot, CoreError> {
        Ok(PositionSnapshot {
            position_id: self.position_id,
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
            leverage: self.leverage,
            margin: self.margin,
            mark_price,
            notional: money::mul(self.quantity, mark_price, "notional")?,
            unrealized_pnl: self.unrealized_pnl(mark_price)?,
            liquidation_price: self.liquidation_price,
            liquidation_distance: self.liquidation_distance(mark_price),
            exit_plan: self.exit_plan.clone(),
            confidence: self.confidence,
            opened_at: self.opened_at,
        })
    }
}

/// A read-only view of a position valued at a mark price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    pub margin: Decimal,
    pub mark_price: Decimal,
    pub notional: Decimal,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Decimal,
    pub liquidation_distance: Option<Decimal>,
    pub exit_plan: ExitPlan,
    pub confidence: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// A read-only view of an account, handed to the translator and to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: Uuid,
    pub base_currency: String,
    pub initial_cash: Decimal,
    pub cash_available: Decimal,
    pub margin_in_use: Decimal,
    /// `cash_available + Σ (margin + unrealized_pnl)`.
    pub equity: Decimal,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub positions: Vec<PositionSnapshot>,
    pub archived: bool,
    pub as_of: Option<DateTime<Utc>>,
}

impl AccountSnapshot {
    pub fn position(&self, symbol: &str) -> Option<&PositionSnapshot> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.iter().map(|p| p.unrealized_pnl).sum()
    }

    /// Return on initial cash in percent, `None` for an unfunded account.
    pub fn return_pct(&self) -> Option<Decimal> {
        if self.initial_cash.is_zero() {
            return None;
        }
        let gain = self.equity - self.initial_cash;
        gain.checked_div(self.initial_cash)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map(|pct| pct.round_dp(4))
    }
}

/// One immutable entry of an account's trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub account_id: Uuid,
    pub symbol: String,
    pub action: TradeAction,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub leverage: Decimal,
    pub notional: Decimal,
    pub fee: Decimal,
    /// `None` for entries; the settled PnL for every exit.
    pub realized_pnl: Option<Decimal>,
    pub resulting_cash: Decimal,
    pub resulting_equity: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    /// Net cash effect of the trade excluding returned or posted margin.
    pub fn net_result(&self) -> Decimal {
        self.realized_pnl.unwrap_or(Decimal::ZERO) - self.fee
    }
}
