use crate::equity::{EquityCurve, EquityPoint};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{
    AccountSnapshot, MarketSnapshot, RejectedSignal, Rejection, Signal, SignalError, TradeRecord,
    parse_signals,
};
use events::{EngineEvent, LogLevel, RejectionNotice};
use executor::{Account, ExecutionEngine};
use risk::{ConfidenceWeightedRouter, OrderTranslator, SignalTranslator};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything one decision cycle did to an account.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub account_id: Uuid,
    pub as_of: DateTime<Utc>,
    /// Positions closed by mark-to-market before any signal was looked at.
    pub forced_exits: Vec<TradeRecord>,
    /// Fills produced by agent signals, in symbol order.
    pub executed: Vec<TradeRecord>,
    pub rejected: Vec<RejectedSignal>,
    /// Symbols whose signal was a hold.
    pub holds: Vec<String>,
    /// Open positions the snapshot carried no price for.
    pub unpriced: Vec<String>,
    /// `true` when the snapshot was older than one already processed and was ignored.
    pub stale: bool,
    pub snapshot: AccountSnapshot,
    pub equity_point: Option<EquityPoint>,
}

/// An account and the equity history the desk keeps for it.
#[derive(Debug)]
struct AccountBook {
    account: Account,
    equity: EquityCurve,
}

/// The decision-cycle driver: owns every simulated account and runs ticks against them.
///
/// Each account sits behind its own lock, held for a whole tick, so two signals in
/// one cycle never size against the same pre-debit cash. Different accounts never
/// contend with each other.
pub struct TradingDesk {
    config: Config,
    engine: ExecutionEngine,
    translator: Arc<dyn OrderTranslator>,
    router: ConfidenceWeightedRouter,
    accounts: RwLock<HashMap<Uuid, Arc<Mutex<AccountBook>>>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl TradingDesk {
    /// Creates a desk with the default [`SignalTranslator`].
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;
        let translator = SignalTranslator::new(config.risk_management.clone(), &config.simulation)?;
        Self::with_translator(config, Arc::new(translator))
    }

    /// Creates a desk that sizes orders with a custom translator.
    pub fn with_translator(
        config: Config,
        translator: Arc<dyn OrderTranslator>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let engine = ExecutionEngine::new(&config.simulation)?;
        let (event_tx, _) = broadcast::channel(config.desk.event_buffer);
        Ok(Self {
            config,
            engine,
            translator,
            router: ConfidenceWeightedRouter,
            accounts: RwLock::new(HashMap::new()),
            event_tx,
        })
    }

    /// Returns a receiver for every event the desk publishes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Opens a new account funded per the `[account]` configuration.
    pub async fn provision(&self) -> Result<Uuid, EngineError> {
        let settings = &self.config.account;
        self.provision_with(settings.initial_cash, &settings.base_currency)
            .await
    }

    pub async fn provision_with(
        &self,
        initial_cash: Decimal,
        base_currency: &str,
    ) -> Result<Uuid, EngineError> {
        let id = Uuid::new_v4();
        let account = Account::new(id, base_currency, initial_cash, self.engine)?;
        let book = AccountBook {
            account,
            equity: EquityCurve::new(initial_cash, self.config.desk.equity_history),
        };
        self.accounts
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(book)));
        info!(account = %id, %initial_cash, %base_currency, "Account provisioned");
        Ok(id)
    }

    pub async fn account_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.accounts.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn snapshot(&self, account_id: Uuid) -> Result<AccountSnapshot, EngineError> {
        let book = self.book(account_id).await?;
        let book = book.lock().await;
        Ok(book.account.snapshot()?)
    }

    /// The `limit` most recent trades, newest first.
    pub async fn trades(&self, account_id: Uuid, limit: usize) -> Result<Vec<TradeRecord>, EngineError> {
        let book = self.book(account_id).await?;
        let book = book.lock().await;
        Ok(book.account.trades().latest(limit).into_iter().cloned().collect())
    }

    pub async fn equity_curve(&self, account_id: Uuid) -> Result<Vec<EquityPoint>, EngineError> {
        let book = self.book(account_id).await?;
        let book = book.lock().await;
        Ok(book.equity.points().cloned().collect())
    }

    pub async fn total_return_pct(&self, account_id: Uuid) -> Result<Option<Decimal>, EngineError> {
        let book = self.book(account_id).await?;
        let book = book.lock().await;
        Ok(book.equity.total_return_pct())
    }

    /// Retires an account. Its history stays readable; later ticks fail.
    pub async fn archive(&self, account_id: Uuid) -> Result<AccountSnapshot, EngineError> {
        let book = self.book(account_id).await?;
        let mut book = book.lock().await;
        book.account.archive();
        let snapshot = book.account.snapshot()?;
        info!(account = %account_id, equity = %snapshot.equity, "Account archived");
        Ok(snapshot)
    }

    /// Runs a tick from raw agent output. Entries that fail to parse are rejected
    /// individually; a payload that is not JSON at all fails the whole call.
    pub async fn run_tick_json(
        &self,
        account_id: Uuid,
        market: &MarketSnapshot,
        payload: &str,
    ) -> Result<TickReport, EngineError> {
        let signals = parse_signals(payload)?;
        self.run_tick(account_id, market, signals).await
    }

    /// Runs one decision cycle: mark-to-market first, then every signal in symbol order.
    ///
    /// Rejected signals are reported, not raised. An `ExecutionFailed` aborts the
    /// rest of the tick; fills and forced exits committed before it stay committed
    /// and are still published, followed by an error `Log` event.
    #[tracing::instrument(skip(self, market, signals), fields(as_of = %market.as_of, signals = signals.len()))]
    pub async fn run_tick(
        &self,
        account_id: Uuid,
        market: &MarketSnapshot,
        signals: Vec<Result<Signal, SignalError>>,
    ) -> Result<TickReport, EngineError> {
        let book = self.book(account_id).await?;
        let mut guard = book.lock().await;
        let book = &mut *guard;
        if book.account.is_archived() {
            return Err(EngineError::AccountArchived(account_id));
        }

        let as_of = market.as_of;
        let mut report = TickReport {
            account_id,
            as_of,
            forced_exits: Vec::new(),
            executed: Vec::new(),
            rejected: Vec::new(),
            holds: Vec::new(),
            unpriced: Vec::new(),
            stale: false,
            snapshot: book.account.snapshot()?,
            equity_point: None,
        };

        let mut valid = Vec::with_capacity(signals.len());
        for signal in signals {
            match signal {
                Ok(signal) => valid.push(signal),
                Err(err) => report.rejected.push(RejectedSignal {
                    symbol: String::new(),
                    signal_kind: None,
                    rejection: err.into(),
                }),
            }
        }

        // --- Stale snapshot: nothing is marked, nothing is traded ---
        if let Some(last_seen) = book.account.as_of().filter(|seen| as_of < *seen) {
            warn!(account = %account_id, %as_of, %last_seen, "Ignoring stale market snapshot");
            self.notify(
                LogLevel::Warn,
                format!("Account {account_id}: ignored snapshot at {as_of}, already saw {last_seen}"),
                as_of,
            );
            report.stale = true;
            for signal in valid {
                report.rejected.push(RejectedSignal {
                    symbol: signal.symbol().to_string(),
                    signal_kind: Some(signal.kind()),
                    rejection: Rejection::StalePrice { as_of, last_seen },
                });
            }
            self.publish(&report);
            return Ok(report);
        }

        // --- 1. Mark-to-market and forced exits ---
        let marked = book.account.mark_to_market(market)?;
        report.forced_exits = marked.closed;
        report.unpriced = marked.unpriced;
        if !report.unpriced.is_empty() {
            warn!(account = %account_id, unpriced = ?report.unpriced, "Open positions missing from snapshot");
            self.notify(
                LogLevel::Warn,
                format!(
                    "Account {account_id}: no price for open {}; keeping last marks",
                    report.unpriced.join(", ")
                ),
                as_of,
            );
        }

        // --- 2. Route conflicting signals ---
        let routed = self.router.route(valid);
        report.rejected.extend(routed.superseded);

        // --- 3. Translate and apply, one symbol at a time ---
        for signal in routed.accepted {
            let symbol = signal.symbol().to_string();
            if matches!(signal, Signal::Hold { .. }) {
                debug!(%symbol, "Hold");
                report.holds.push(symbol);
                continue;
            }
            let Some(price) = market.price(&symbol) else {
                report.rejected.push(RejectedSignal {
                    signal_kind: Some(signal.kind()),
                    rejection: Rejection::MissingPrice { symbol: symbol.clone() },
                    symbol,
                });
                continue;
            };

            let account_snapshot = book.account.snapshot()?;
            let position = book.account.position_snapshot(&symbol)?;
            match self
                .translator
                .translate(&signal, &account_snapshot, position.as_ref(), price)
            {
                Ok(Some(order)) => match book.account.apply(&order, as_of) {
                    Ok(applied) => report.executed.push(applied.record),
                    Err(err) => {
                        // Forced exits and earlier fills are already committed.
                        report.snapshot = book.account.snapshot()?;
                        report.equity_point = Some(book.equity.record(&report.snapshot, as_of));
                        self.notify(
                            LogLevel::Error,
                            format!("Account {account_id}: tick aborted on {symbol}: {err}"),
                            as_of,
                        );
                        self.publish(&report);
                        return Err(err.into());
                    }
                },
                Ok(None) => report.holds.push(symbol),
                Err(rejection) => report.rejected.push(RejectedSignal {
                    symbol,
                    signal_kind: Some(signal.kind()),
                    rejection,
                }),
            }
        }

        for rejected in &report.rejected {
            warn!(
                account = %account_id,
                symbol = %rejected.symbol,
                kind = %rejected.kind(),
                reason = %rejected.rejection,
                "Signal rejected"
            );
        }

        // --- 4. Close the books for this tick ---
        let account = &book.account;
        if let Err(breach) = account.trades().verify_conservation(
            account.initial_cash(),
            account.cash_available(),
            account.margin_in_use(),
        ) {
            error!(account = %account_id, error = %breach, "Ledger out of balance");
            return Err(breach.into());
        }
        report.snapshot = account.snapshot()?;
        let point = book.equity.record(&report.snapshot, as_of);
        report.equity_point = Some(point);

        info!(
            account = %account_id,
            executed = report.executed.len(),
            forced = report.forced_exits.len(),
            rejected = report.rejected.len(),
            equity = %report.snapshot.equity,
            "Tick complete"
        );
        self.publish(&report);
        Ok(report)
    }

    async fn book(&self, account_id: Uuid) -> Result<Arc<Mutex<AccountBook>>, EngineError> {
        self.accounts
            .read()
            .await
            .get(&account_id)
            .cloned()
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    fn notify(&self, level: LogLevel, message: String, at: DateTime<Utc>) {
        let _ = self.event_tx.send(EngineEvent::log(level, message, at));
    }

    fn publish(&self, report: &TickReport) {
        // Sending only fails when nobody is subscribed.
        for record in &report.forced_exits {
            let _ = self.event_tx.send(EngineEvent::RiskExit(record.clone()));
        }
        for record in &report.executed {
            let _ = self.event_tx.send(EngineEvent::TradeExecuted(record.clone()));
        }
        for rejected in &report.rejected {
            let _ = self.event_tx.send(EngineEvent::SignalRejected(RejectionNotice {
                account_id: report.account_id,
                timestamp: report.as_of,
                rejected: rejected.clone(),
            }));
        }
        let _ = self
            .event_tx
            .send(EngineEvent::AccountUpdated(report.snapshot.clone()));
    }
}
