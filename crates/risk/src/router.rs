use core_types::{RejectedSignal, Rejection, Signal};
use std::collections::BTreeMap;

/// The outcome of routing one decision cycle's signals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Routed {
    /// At most one signal per symbol, ordered by symbol.
    pub accepted: Vec<Signal>,
    pub superseded: Vec<RejectedSignal>,
}

/// Settles conflicting signals for the same symbol by keeping the most confident one.
///
/// Ties go to the signal that arrived first. Every other signal for that symbol is
/// rejected as superseded and never reaches the translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceWeightedRouter;

impl ConfidenceWeightedRouter {
    pub fn route(&self, signals: Vec<Signal>) -> Routed {
        let mut by_symbol: BTreeMap<String, Vec<Signal>> = BTreeMap::new();
        for signal in signals {
            by_symbol.entry(signal.symbol().to_string()).or_default().push(signal);
        }

        let mut routed = Routed::default();
        for (symbol, candidates) in by_symbol {
            let mut winner_idx = 0;
            for (idx, candidate) in candidates.iter().enumerate().skip(1) {
                if candidate.confidence() > candidates[winner_idx].confidence() {
                    winner_idx = idx;
                }
            }

            let mut candidates = candidates;
            let winner = candidates.remove(winner_idx);
            for loser in candidates {
                tracing::debug!(
                    %symbol,
                    kept = %winner.kind(),
                    dropped = %loser.kind(),
                    "Conflicting signals, keeping the most confident"
                );
                routed.superseded.push(RejectedSignal {
                    symbol: symbol.clone(),
                    signal_kind: Some(loser.kind()),
                    rejection: Rejection::SupersededSignal {
                        winner: winner.kind(),
                        winning_confidence: winner.confidence(),
                    },
                });
            }
            routed.accepted.push(winner);
        }
        routed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{RejectionKind, SignalKind};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn hold(symbol: &str, confidence: Decimal) -> Signal {
        Signal::Hold {
            symbol: symbol.into(),
            confidence,
        }
    }

    fn close(symbol: &str, confidence: Decimal) -> Signal {
        Signal::Close {
            symbol: symbol.into(),
            confidence,
        }
    }

    #[test]
    fn keeps_highest_confidence_per_symbol() {
        let routed = ConfidenceWeightedRouter.route(vec![
            hold("ETH", dec!(0.4)),
            close("ETH", dec!(0.8)),
            hold("BTC", dec!(0.1)),
        ]);
        assert_eq!(routed.accepted, vec![hold("BTC", dec!(0.1)), close("ETH", dec!(0.8))]);
        assert_eq!(routed.superseded.len(), 1);
        let rejected = &routed.superseded[0];
        assert_eq!(rejected.symbol, "ETH");
        assert_eq!(rejected.signal_kind, Some(SignalKind::Hold));
        assert_eq!(rejected.kind(), RejectionKind::ValidationRejected);
    }

    #[test]
    fn first_signal_wins_ties() {
        let routed = ConfidenceWeightedRouter.route(vec![close("SOL", dec!(0.5)), hold("SOL", dec!(0.5))]);
        assert_eq!(routed.accepted, vec![close("SOL", dec!(0.5))]);
        assert!(matches!(
            routed.superseded[0].rejection,
            Rejection::SupersededSignal { winner: SignalKind::Close, .. }
        ));
    }

    #[test]
    fn empty_batch_routes_nothing() {
        assert_eq!(ConfidenceWeightedRouter.route(Vec::new()), Routed::default());
    }
}
