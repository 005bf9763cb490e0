use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::{Config, RiskManagement, Simulation};
use core_types::{
    AccountSnapshot, MarketSnapshot, Order, PositionSnapshot, Rejection, RejectionKind, Signal,
    TradeAction, parse_signals,
};
use engine::{EngineError, TradingDesk};
use events::{EngineEvent, LogLevel};
use executor::ExecutorError;
use risk::{OrderTranslator, SignalTranslator};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const BUY_BTC: &str = r#"{
    "signal": "buy_to_enter",
    "symbol": "BTC",
    "leverage": 5,
    "allocation_pct": 0.2,
    "profit_target": 56000,
    "stop_loss": 48500,
    "invalidation_condition": "4h close below 48000",
    "confidence": 0.7
}"#;

const CLOSE_BTC: &str = r#"{"signal": "close", "symbol": "BTC", "confidence": 0.8}"#;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap()
}

fn market(minutes: i64, prices: &[(&str, Decimal)]) -> MarketSnapshot {
    prices
        .iter()
        .fold(MarketSnapshot::new(start() + Duration::minutes(minutes)), |m, (s, p)| {
            m.with_price(s, *p)
        })
}

async fn desk_with_account() -> (TradingDesk, uuid::Uuid) {
    let desk = TradingDesk::new(Config::default()).unwrap();
    let id = desk.provision().await.unwrap();
    (desk, id)
}

#[tokio::test]
async fn open_then_close_round_trip() {
    let (desk, id) = desk_with_account().await;

    let report = desk
        .run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();
    assert!(report.rejected.is_empty());
    assert_eq!(report.executed.len(), 1);
    let snapshot = &report.snapshot;
    assert_eq!(snapshot.cash_available, dec!(7995));
    let position = snapshot.position("BTC").unwrap();
    assert_eq!(position.entry_price, dec!(50000));
    assert_eq!(position.quantity, dec!(0.2));
    assert_eq!(position.leverage, dec!(5));

    let report = desk
        .run_tick_json(id, &market(5, &[("BTC", dec!(55000))]), CLOSE_BTC)
        .await
        .unwrap();
    assert_eq!(report.executed.len(), 1);
    assert_eq!(report.executed[0].realized_pnl, Some(dec!(5000)));
    assert_eq!(report.executed[0].fee, dec!(5.5));
    assert_eq!(report.executed[0].net_result(), dec!(4994.5));
    assert_eq!(report.snapshot.cash_available, dec!(14989.5));
    assert!(report.snapshot.positions.is_empty());
    assert_eq!(report.snapshot.total_fees, dec!(10.5));

    let trades = desk.trades(id, 10).await.unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].action, TradeAction::Close);
    assert_eq!(desk.equity_curve(id).await.unwrap().len(), 2);
    assert_eq!(desk.total_return_pct(id).await.unwrap(), Some(dec!(49.895)));
}

#[tokio::test]
async fn second_entry_is_a_state_conflict() {
    let (desk, id) = desk_with_account().await;
    desk.run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();

    let report = desk
        .run_tick_json(id, &market(1, &[("BTC", dec!(50100))]), BUY_BTC)
        .await
        .unwrap();
    assert!(report.executed.is_empty());
    assert_eq!(report.rejected[0].kind(), RejectionKind::StateConflict);
    assert_eq!(report.snapshot.positions.len(), 1);

    let hedge = BUY_BTC
        .replace("buy_to_enter", "sell_to_enter")
        .replace("56000", "45000")
        .replace("48500", "52000");
    let report = desk
        .run_tick_json(id, &market(2, &[("BTC", dec!(50100))]), &hedge)
        .await
        .unwrap();
    assert_eq!(report.rejected[0].kind(), RejectionKind::StateConflict);
}

#[tokio::test]
async fn close_without_position_is_rejected() {
    let (desk, id) = desk_with_account().await;
    let report = desk
        .run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), CLOSE_BTC)
        .await
        .unwrap();
    assert!(matches!(report.rejected[0].rejection, Rejection::NoOpenPosition { .. }));
    assert_eq!(report.snapshot.cash_available, dec!(10000));
}

#[tokio::test]
async fn adverse_mark_liquidates_before_signals() {
    let (desk, id) = desk_with_account().await;
    let wide_stop = BUY_BTC.replace("48500", "40000");
    desk.run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), &wide_stop)
        .await
        .unwrap();

    // Liquidation sits at 48000 for 5x with the full margin buffer.
    let report = desk
        .run_tick_json(id, &market(1, &[("BTC", dec!(47900))]), CLOSE_BTC)
        .await
        .unwrap();
    assert_eq!(report.forced_exits.len(), 1);
    assert_eq!(report.forced_exits[0].action, TradeAction::Liquidation);
    assert_eq!(report.forced_exits[0].realized_pnl, Some(dec!(-2000)));
    // The agent's close arrives after the position is already gone.
    assert_eq!(report.rejected[0].kind(), RejectionKind::StateConflict);
    assert!(report.snapshot.cash_available >= Decimal::ZERO);
    assert_eq!(report.snapshot.cash_available, dec!(7995));
}

#[tokio::test]
async fn take_profit_closes_on_mark() {
    let (desk, id) = desk_with_account().await;
    desk.run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();
    let report = desk
        .run_tick(id, &market(1, &[("BTC", dec!(56500))]), Vec::new())
        .await
        .unwrap();
    assert_eq!(report.forced_exits[0].action, TradeAction::TakeProfit);
    assert_eq!(report.forced_exits[0].realized_pnl, Some(dec!(6500)));
}

#[tokio::test]
async fn stale_snapshot_is_ignored() {
    let (desk, id) = desk_with_account().await;
    desk.run_tick_json(id, &market(10, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();

    let mut rx = desk.subscribe();
    let report = desk
        .run_tick_json(id, &market(5, &[("BTC", dec!(40000))]), CLOSE_BTC)
        .await
        .unwrap();
    assert!(report.stale);
    assert!(report.forced_exits.is_empty());
    match rx.try_recv().unwrap() {
        EngineEvent::Log(log) => assert_eq!(log.level, LogLevel::Warn),
        other => panic!("expected a warning first, got {other:?}"),
    }
    assert!(matches!(report.rejected[0].rejection, Rejection::StalePrice { .. }));
    assert_eq!(report.snapshot.positions.len(), 1);
    assert!(report.equity_point.is_none());
}

#[tokio::test]
async fn missing_price_rejects_the_signal() {
    let (desk, id) = desk_with_account().await;
    let report = desk
        .run_tick_json(id, &market(0, &[("ETH", dec!(3000))]), BUY_BTC)
        .await
        .unwrap();
    assert!(matches!(report.rejected[0].rejection, Rejection::MissingPrice { .. }));
    assert_eq!(report.rejected[0].kind(), RejectionKind::ValidationRejected);
}

#[tokio::test]
async fn zero_cash_account_rejects_entries() {
    let desk = TradingDesk::new(Config::default()).unwrap();
    let id = desk.provision_with(dec!(0), "USD").await.unwrap();
    let report = desk
        .run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();
    assert_eq!(report.rejected[0].kind(), RejectionKind::InsufficientCapital);
}

#[tokio::test]
async fn conflicting_signals_keep_the_most_confident() {
    let (desk, id) = desk_with_account().await;
    let payload = format!(
        r#"[{BUY_BTC}, {{"signal": "hold", "symbol": "btc", "confidence": 0.9}}, {{"signal": "bogus"}}]"#
    );
    let report = desk
        .run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), &payload)
        .await
        .unwrap();
    assert!(report.executed.is_empty());
    assert_eq!(report.holds, vec!["BTC".to_string()]);
    assert_eq!(report.rejected.len(), 2);
    assert!(report
        .rejected
        .iter()
        .any(|r| matches!(r.rejection, Rejection::SupersededSignal { .. })));
    assert!(report
        .rejected
        .iter()
        .any(|r| matches!(r.rejection, Rejection::MalformedSignal { .. })));
    assert_eq!(report.snapshot.cash_available, dec!(10000));
}

#[tokio::test]
async fn hold_never_mutates_state() {
    let (desk, id) = desk_with_account().await;
    desk.run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();
    let before = desk.snapshot(id).await.unwrap();
    let signals = parse_signals(r#"{"signal": "hold", "symbol": "BTC"}"#).unwrap();
    let report = desk
        .run_tick(id, &market(0, &[("BTC", dec!(50000))]), signals)
        .await
        .unwrap();
    assert_eq!(report.holds, vec!["BTC".to_string()]);
    assert_eq!(report.snapshot.cash_available, before.cash_available);
    assert_eq!(report.snapshot.positions, before.positions);
    assert_eq!(desk.trades(id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn archived_accounts_refuse_ticks() {
    let (desk, id) = desk_with_account().await;
    let snapshot = desk.archive(id).await.unwrap();
    assert!(snapshot.archived);
    let result = desk
        .run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await;
    assert!(matches!(result, Err(EngineError::AccountArchived(_))));
    // History stays readable.
    assert!(desk.snapshot(id).await.is_ok());
}

#[tokio::test]
async fn unknown_account_is_an_error() {
    let desk = TradingDesk::new(Config::default()).unwrap();
    let result = desk.snapshot(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(EngineError::AccountNotFound(_))));
}

#[tokio::test]
async fn events_are_broadcast_per_tick() {
    let (desk, id) = desk_with_account().await;
    let mut rx = desk.subscribe();
    desk.run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, EngineEvent::TradeExecuted(ref r) if r.symbol == "BTC"));
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, EngineEvent::AccountUpdated(ref s) if s.account_id == id));
    assert_eq!(second.account_id(), Some(id));
}

#[tokio::test]
async fn accounts_run_independently() {
    let desk = Arc::new(TradingDesk::new(Config::default()).unwrap());
    let first = desk.provision().await.unwrap();
    let second = desk.provision().await.unwrap();

    let snapshot = market(0, &[("BTC", dec!(50000))]);
    let (a, b) = tokio::join!(
        desk.run_tick_json(first, &snapshot, BUY_BTC),
        desk.run_tick_json(second, &snapshot, CLOSE_BTC),
    );
    assert_eq!(a.unwrap().executed.len(), 1);
    assert_eq!(b.unwrap().rejected.len(), 1);

    let first_snapshot = desk.snapshot(first).await.unwrap();
    let second_snapshot = desk.snapshot(second).await.unwrap();
    assert_eq!(first_snapshot.cash_available, dec!(7995));
    assert_eq!(second_snapshot.cash_available, dec!(10000));
    assert_eq!(desk.account_ids().await.len(), 2);
}

#[tokio::test]
async fn signals_for_several_symbols_size_against_fresh_cash() {
    let (desk, id) = desk_with_account().await;
    let eth = BUY_BTC
        .replace("BTC", "ETH")
        .replace("56000", "3300")
        .replace("48500", "2900");
    let payload = format!("[{BUY_BTC}, {eth}]");
    let report = desk
        .run_tick_json(
            id,
            &market(0, &[("BTC", dec!(50000)), ("ETH", dec!(3000))]),
            &payload,
        )
        .await
        .unwrap();
    assert_eq!(report.executed.len(), 2);
    // BTC fills first and leaves 7995; ETH then sizes 7995 * 5 * 0.2 = 7995 notional.
    let eth_fill = &report.executed[1];
    assert_eq!(eth_fill.symbol, "ETH");
    assert_eq!(eth_fill.notional, dec!(7995));
    assert_eq!(
        report.snapshot.position("ETH").map(|p| p.quantity),
        Some(dec!(2.665))
    );
}

#[tokio::test]
async fn lowercase_price_keys_still_match() {
    let (desk, id) = desk_with_account().await;
    let snapshot: MarketSnapshot =
        serde_json::from_str(r#"{"as_of": "2025-01-06T12:00:00Z", "prices": {"btc": 50000}}"#).unwrap();
    let buy = BUY_BTC.replace("\"BTC\"", "\"btc\"");
    let report = desk.run_tick_json(id, &snapshot, &buy).await.unwrap();
    assert!(report.rejected.is_empty());
    assert_eq!(report.executed.len(), 1);
    assert_eq!(report.executed[0].symbol, "BTC");

    // A hand-built snapshot with lowercase keys still drives the stop loss.
    let mut lower = MarketSnapshot::new(start() + Duration::minutes(1));
    lower.prices.insert("btc".to_string(), dec!(48400));
    let report = desk.run_tick(id, &lower, Vec::new()).await.unwrap();
    assert!(report.unpriced.is_empty());
    assert_eq!(report.forced_exits[0].action, TradeAction::StopLoss);
}

/// Builds valid orders, then corrupts any ETH order so the engine refuses it.
struct CorruptEthOrders(SignalTranslator);

impl OrderTranslator for CorruptEthOrders {
    fn translate(
        &self,
        signal: &Signal,
        account: &AccountSnapshot,
        position: Option<&PositionSnapshot>,
        price: Decimal,
    ) -> Result<Option<Order>, Rejection> {
        let order = self.0.translate(signal, account, position, price)?;
        Ok(order.map(|mut order| {
            if order.symbol == "ETH" {
                order.notional_usd += Decimal::ONE;
            }
            order
        }))
    }
}

#[tokio::test]
async fn failed_execution_still_publishes_forced_exits() {
    let config = Config::default();
    let inner = SignalTranslator::new(RiskManagement::default(), &Simulation::default()).unwrap();
    let desk = TradingDesk::with_translator(config, Arc::new(CorruptEthOrders(inner))).unwrap();
    let id = desk.provision().await.unwrap();
    desk.run_tick_json(id, &market(0, &[("BTC", dec!(50000))]), BUY_BTC)
        .await
        .unwrap();

    let mut rx = desk.subscribe();
    let eth = BUY_BTC
        .replace("BTC", "ETH")
        .replace("56000", "3300")
        .replace("48500", "2900");
    // BTC falls through its 48500 stop in the same tick the ETH entry fails.
    let result = desk
        .run_tick_json(id, &market(1, &[("BTC", dec!(48400)), ("ETH", dec!(3000))]), &eth)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Executor(ExecutorError::ExecutionFailed { .. }))
    ));

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Log(log) if log.level == LogLevel::Error
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::RiskExit(record) if record.symbol == "BTC" && record.action == TradeAction::StopLoss
    )));
    assert!(matches!(events.last(), Some(EngineEvent::AccountUpdated(_))));

    let snapshot = desk.snapshot(id).await.unwrap();
    assert!(snapshot.positions.is_empty());
    // 7995 + 400 returned (2000 margin - 1600 loss) - 4.84 fee
    assert_eq!(snapshot.cash_available, dec!(8390.16));
    assert_eq!(desk.trades(id, 10).await.unwrap().len(), 2);
    assert_eq!(desk.equity_curve(id).await.unwrap().len(), 2);
}
