use chrono::{DateTime, Utc};
use core_types::AccountSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Account value at the end of one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub as_of: DateTime<Utc>,
    pub equity: Decimal,
    pub cash: Decimal,
    pub margin_in_use: Decimal,
    /// Change against the previous point (or initial cash for the first one), in percent.
    pub period_return_pct: Option<Decimal>,
}

/// A bounded history of equity points for one account.
#[derive(Debug, Clone)]
pub struct EquityCurve {
    initial_cash: Decimal,
    capacity: usize,
    points: VecDeque<EquityPoint>,
}

impl EquityCurve {
    pub fn new(initial_cash: Decimal, capacity: usize) -> Self {
        Self {
            initial_cash,
            capacity: capacity.max(1),
            points: VecDeque::new(),
        }
    }

    pub fn record(&mut self, snapshot: &AccountSnapshot, as_of: DateTime<Utc>) -> EquityPoint {
        let previous = self.latest().map_or(self.initial_cash, |p| p.equity);
        let point = EquityPoint {
            as_of,
            equity: snapshot.equity,
            cash: snapshot.cash_available,
            margin_in_use: snapshot.margin_in_use,
            period_return_pct: percent_change(previous, snapshot.equity),
        };
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point.clone());
        point
    }

    pub fn latest(&self) -> Option<&EquityPoint> {
        self.points.back()
    }

    pub fn points(&self) -> impl Iterator<Item = &EquityPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return of the latest point against initial cash, in percent.
    pub fn total_return_pct(&self) -> Option<Decimal> {
        self.latest()
            .and_then(|p| percent_change(self.initial_cash, p.equity))
    }
}

fn percent_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    if from.is_zero() {
        return None;
    }
    (to - from)
        .checked_div(from)
        .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
        .map(|pct| pct.round_dp(4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn snapshot(equity: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            account_id: Uuid::nil(),
            base_currency: "USD".into(),
            initial_cash: dec!(10000),
            cash_available: equity,
            margin_in_use: dec!(0),
            equity,
            realized_pnl: dec!(0),
            total_fees: dec!(0),
            positions: Vec::new(),
            archived: false,
            as_of: None,
        }
    }

    #[test]
    fn tracks_period_and_total_returns() {
        let start = Utc::now();
        let mut curve = EquityCurve::new(dec!(10000), 10);
        let first = curve.record(&snapshot(dec!(10500)), start);
        assert_eq!(first.period_return_pct, Some(dec!(5)));
        let second = curve.record(&snapshot(dec!(9975)), start + Duration::hours(1));
        assert_eq!(second.period_return_pct, Some(dec!(-5)));
        assert_eq!(curve.total_return_pct(), Some(dec!(-0.25)));
    }

    #[test]
    fn keeps_only_the_most_recent_points() {
        let start = Utc::now();
        let mut curve = EquityCurve::new(dec!(100), 2);
        for i in 0..5 {
            curve.record(&snapshot(Decimal::from(100 + i)), start + Duration::minutes(i));
        }
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.points().next().map(|p| p.equity), Some(dec!(103)));
        assert_eq!(curve.total_return_pct(), Some(dec!(4)));
    }

    #[test]
    fn unfunded_accounts_have_no_returns() {
        let mut curve = EquityCurve::new(dec!(0), 4);
        assert!(curve.record(&snapshot(dec!(0)), Utc::now()).period_return_pct.is_none());
        assert!(curve.total_return_pct().is_none());
    }
}
