use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// `1` for longs and `-1` for shorts, used to sign price moves into PnL.
    pub fn sign(&self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// The four instructions an agent is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    BuyToEnter,
    SellToEnter,
    Hold,
    Close,
}

impl SignalKind {
    /// The side a position would be opened on, for the two entry kinds.
    pub fn entry_side(&self) -> Option<PositionSide> {
        match self {
            SignalKind::BuyToEnter => Some(PositionSide::Long),
            SignalKind::SellToEnter => Some(PositionSide::Short),
            SignalKind::Hold | SignalKind::Close => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::BuyToEnter => "buy_to_enter",
            SignalKind::SellToEnter => "sell_to_enter",
            SignalKind::Hold => "hold",
            SignalKind::Close => "close",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    /// Case-insensitive; dashes and spaces are accepted in place of underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "buy_to_enter" => Ok(SignalKind::BuyToEnter),
            "sell_to_enter" => Ok(SignalKind::SellToEnter),
            "hold" => Ok(SignalKind::Hold),
            "close" => Ok(SignalKind::Close),
            _ => Err(s.to_string()),
        }
    }
}

/// A risk rule that closed a position without an agent signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    StopLoss,
    TakeProfit,
    Liquidation,
}

/// What a single trade record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    BuyToEnter,
    SellToEnter,
    Close,
    StopLoss,
    TakeProfit,
    Liquidation,
}

impl From<ExitTrigger> for TradeAction {
    fn from(trigger: ExitTrigger) -> Self {
        match trigger {
            ExitTrigger::StopLoss => TradeAction::StopLoss,
            ExitTrigger::TakeProfit => TradeAction::TakeProfit,
            ExitTrigger::Liquidation => TradeAction::Liquidation,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TradeAction::BuyToEnter => "buy_to_enter",
            TradeAction::SellToEnter => "sell_to_enter",
            TradeAction::Close => "close",
            TradeAction::StopLoss => "stop_loss",
            TradeAction::TakeProfit => "take_profit",
            TradeAction::Liquidation => "liquidation",
        };
        f.write_str(label)
    }
}

/// Lifecycle state of one (account, symbol) leg.
///
/// `Liquidated` is only ever reported on the transition that forced the close;
/// afterwards the symbol rests in `Flat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolState {
    Flat,
    Open,
    Liquidated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_kind_parses_loose_spellings() {
        assert_eq!("BUY_TO_ENTER".parse::<SignalKind>(), Ok(SignalKind::BuyToEnter));
        assert_eq!("sell-to-enter".parse::<SignalKind>(), Ok(SignalKind::SellToEnter));
        assert_eq!(" Hold ".parse::<SignalKind>(), Ok(SignalKind::Hold));
        assert_eq!("close".parse::<SignalKind>(), Ok(SignalKind::Close));
        assert!("buy".parse::<SignalKind>().is_err());
    }

    #[test]
    fn entry_side_only_for_entries() {
        assert_eq!(SignalKind::BuyToEnter.entry_side(), Some(PositionSide::Long));
        assert_eq!(SignalKind::SellToEnter.entry_side(), Some(PositionSide::Short));
        assert_eq!(SignalKind::Hold.entry_side(), None);
        assert_eq!(SignalKind::Close.entry_side(), None);
    }

    #[test]
    fn triggers_map_to_their_actions() {
        assert_eq!(TradeAction::from(ExitTrigger::StopLoss), TradeAction::StopLoss);
        assert_eq!(TradeAction::from(ExitTrigger::TakeProfit), TradeAction::TakeProfit);
        assert_eq!(TradeAction::from(ExitTrigger::Liquidation), TradeAction::Liquidation);
    }
}
