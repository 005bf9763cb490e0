use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, RejectedSignal, TradeRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A free-form, human-readable note attached to the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A signal that did not become an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionNotice {
    pub account_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub rejected: RejectedSignal,
}

/// Everything the desk reports while it processes decision cycles.
///
/// Serialized as `{"type": "TradeExecuted", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// A structured log message.
    Log(LogMessage),
    /// An agent signal was filled.
    TradeExecuted(TradeRecord),
    /// A position was forced flat by its stop loss, profit target or liquidation price.
    RiskExit(TradeRecord),
    SignalRejected(RejectionNotice),
    /// The account's state after a decision cycle.
    AccountUpdated(AccountSnapshot),
}

impl EngineEvent {
    pub fn log(level: LogLevel, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        EngineEvent::Log(LogMessage {
            timestamp,
            level,
            message: message.into(),
        })
    }

    /// The account the event concerns, if any.
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::Log(_) => None,
            EngineEvent::TradeExecuted(record) | EngineEvent::RiskExit(record) => Some(record.account_id),
            EngineEvent::SignalRejected(notice) => Some(notice.account_id),
            EngineEvent::AccountUpdated(snapshot) => Some(snapshot.account_id),
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}
