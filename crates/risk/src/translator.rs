use crate::OrderTranslator;
use crate::error::RiskError;
use configuration::{RiskManagement, Simulation};
use core_types::money::truncate_quantity;
use core_types::{
    AccountSnapshot, EntryIntent, Order, PositionSide, PositionSnapshot, Rejection, Signal, Sizing,
};
use rust_decimal::Decimal;
use tracing::debug;

/// The concrete [`OrderTranslator`] used by the desk.
///
/// Entries are sized as a fraction of available cash scaled by leverage, capped by
/// `max_allocation_pct`. Checks run in a fixed order so a signal that breaks
/// several rules always reports the same reason: price sanity, position state,
/// leverage limit, capital, minimum notional, then exit-plan sanity.
#[derive(Debug, Clone)]
pub struct SignalTranslator {
    params: RiskManagement,
    fee_rate: Decimal,
}

impl SignalTranslator {
    /// Creates a new `SignalTranslator` with the given configuration parameters.
    pub fn new(params: RiskManagement, simulation: &Simulation) -> Result<Self, RiskError> {
        // Validate that risk parameters are logical.
        if params.max_allocation_pct <= Decimal::ZERO || params.max_allocation_pct > Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "max_allocation_pct must be in (0, 1]".to_string(),
            ));
        }
        if params.max_leverage < Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "max_leverage must be at least 1".to_string(),
            ));
        }
        if params.min_notional_usd < Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "min_notional_usd must not be negative".to_string(),
            ));
        }
        if simulation.taker_fee_pct < Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "taker_fee_pct must not be negative".to_string(),
            ));
        }
        Ok(Self {
            params,
            fee_rate: simulation.taker_fee_pct,
        })
    }

    fn open(
        &self,
        side: PositionSide,
        intent: &EntryIntent,
        account: &AccountSnapshot,
        position: Option<&PositionSnapshot>,
        price: Decimal,
    ) -> Result<Order, Rejection> {
        let symbol = intent.symbol.as_str();

        // --- 0. Price sanity ---
        if price <= Decimal::ZERO {
            return Err(Rejection::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }

        // --- 1. Position state ---
        // No pyramiding on the same side, no hedging on the other.
        if let Some(open) = position {
            return Err(Rejection::PositionAlreadyOpen {
                symbol: symbol.to_string(),
                side: open.side,
            });
        }

        // --- 1b. Leverage limit ---
        if intent.leverage > self.params.max_leverage {
            return Err(Rejection::LeverageAboveLimit {
                requested: intent.leverage,
                max: self.params.max_leverage,
            });
        }

        // --- 2. Capital ---
        let cash = account.cash_available;
        if cash <= Decimal::ZERO {
            return Err(Rejection::NonPositiveCash { cash });
        }
        let buying_power = checked(cash.checked_mul(intent.leverage), symbol)?;
        let cap = checked(buying_power.checked_mul(self.params.max_allocation_pct), symbol)?;
        let target_notional = match intent.sizing {
            Sizing::AllocationPct(pct) => {
                checked(buying_power.checked_mul(pct.min(self.params.max_allocation_pct)), symbol)?
            }
            Sizing::Quantity(quantity) => checked(quantity.checked_mul(price), symbol)?.min(cap),
        };
        let quantity = truncate_quantity(checked(target_notional.checked_div(price), symbol)?);

        let order = Order::open(
            symbol,
            side,
            quantity,
            intent.leverage,
            price,
            self.fee_rate,
            intent.exit_plan.clone(),
            intent.confidence,
        )
        .map_err(|e| unsizable(symbol, e))?;
        let margin = order.margin().map_err(|e| unsizable(symbol, e))?;

        debug!(
            %symbol, %side, %price, %target_notional, %quantity,
            notional = %order.notional_usd, %margin, fee = %order.fee_usd,
            "Sized entry"
        );

        if margin + order.fee_usd > cash {
            return Err(Rejection::MarginExceedsCash {
                margin,
                fee: order.fee_usd,
                cash,
            });
        }

        // --- 3. Minimum trade size ---
        if quantity.is_zero() || order.notional_usd < self.params.min_notional_usd {
            return Err(Rejection::BelowMinimumNotional {
                notional: order.notional_usd,
                minimum: self.params.min_notional_usd,
            });
        }

        // --- 4. Exit plan sanity ---
        let plan = &intent.exit_plan;
        let (target_ok, stop_ok) = match side {
            PositionSide::Long => (plan.profit_target > price, plan.stop_loss < price),
            PositionSide::Short => (plan.profit_target < price, plan.stop_loss > price),
        };
        if !target_ok {
            return Err(Rejection::ProfitTargetWrongSide {
                side,
                entry: price,
                profit_target: plan.profit_target,
            });
        }
        if !stop_ok {
            return Err(Rejection::StopLossWrongSide {
                side,
                entry: price,
                stop_loss: plan.stop_loss,
            });
        }

        Ok(order)
    }

    fn close(
        &self,
        symbol: &str,
        position: Option<&PositionSnapshot>,
        price: Decimal,
    ) -> Result<Order, Rejection> {
        if price <= Decimal::ZERO {
            return Err(Rejection::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }
        let Some(position) = position else {
            return Err(Rejection::NoOpenPosition {
                symbol: symbol.to_string(),
            });
        };
        Order::close(position, price, self.fee_rate, None).map_err(|e| unsizable(symbol, e))
    }
}

impl OrderTranslator for SignalTranslator {
    fn translate(
        &self,
        signal: &Signal,
        account: &AccountSnapshot,
        position: Option<&PositionSnapshot>,
        price: Decimal,
    ) -> Result<Option<Order>, Rejection> {
        match signal {
            Signal::Hold { .. } => Ok(None),
            Signal::Close { symbol, .. } => self.close(symbol, position, price).map(Some),
            Signal::BuyToEnter(intent) => self
                .open(PositionSide::Long, intent, account, position, price)
                .map(Some),
            Signal::SellToEnter(intent) => self
                .open(PositionSide::Short, intent, account, position, price)
                .map(Some),
        }
    }
}

fn checked(value: Option<Decimal>, symbol: &str) -> Result<Decimal, Rejection> {
    value.ok_or_else(|| Rejection::Unsizable {
        symbol: symbol.to_string(),
        message: "arithmetic overflow".to_string(),
    })
}

fn unsizable(symbol: &str, err: core_types::CoreError) -> Rejection {
    Rejection::Unsizable {
        symbol: symbol.to_string(),
        message: err.to_string(),
    }
}
