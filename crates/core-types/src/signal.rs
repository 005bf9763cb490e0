//! Agent signals and the boundary that validates them.
//!
//! The agent speaks loosely-typed JSON. [`RawSignal`] mirrors that payload field
//! for field; [`Signal`] is the closed, validated form the rest of the system
//! works with. The conversion between the two is the only place a malformed
//! payload can be rejected, so nothing downstream re-checks signal shape.

use crate::enums::SignalKind;
use crate::error::SignalError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the agent intends to leave a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub profit_target: Decimal,
    pub stop_loss: Decimal,
    /// Free-form condition under which the agent considers its thesis broken.
    #[serde(default)]
    pub invalidation_condition: String,
}

/// How the agent sized an entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sizing {
    /// Fraction of available cash (before leverage) to commit, in (0, 1].
    AllocationPct(Decimal),
    /// Quantity in base units.
    Quantity(Decimal),
}

/// Payload shared by `buy_to_enter` and `sell_to_enter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryIntent {
    pub symbol: String,
    pub leverage: Decimal,
    pub sizing: Sizing,
    pub exit_plan: ExitPlan,
    pub confidence: Decimal,
}

/// A validated trading instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSignal", into = "RawSignal")]
pub enum Signal {
    BuyToEnter(EntryIntent),
    SellToEnter(EntryIntent),
    Hold { symbol: String, confidence: Decimal },
    Close { symbol: String, confidence: Decimal },
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::BuyToEnter(_) => SignalKind::BuyToEnter,
            Signal::SellToEnter(_) => SignalKind::SellToEnter,
            Signal::Hold { .. } => SignalKind::Hold,
            Signal::Close { .. } => SignalKind::Close,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Signal::BuyToEnter(intent) | Signal::SellToEnter(intent) => &intent.symbol,
            Signal::Hold { symbol, .. } | Signal::Close { symbol, .. } => symbol,
        }
    }

    pub fn confidence(&self) -> Decimal {
        match self {
            Signal::BuyToEnter(intent) | Signal::SellToEnter(intent) => intent.confidence,
            Signal::Hold { confidence, .. } | Signal::Close { confidence, .. } => *confidence,
        }
    }

    /// The entry payload, for the two entry kinds.
    pub fn entry(&self) -> Option<&EntryIntent> {
        match self {
            Signal::BuyToEnter(intent) | Signal::SellToEnter(intent) => Some(intent),
            Signal::Hold { .. } | Signal::Close { .. } => None,
        }
    }
}

/// The agent's payload as it arrives on the wire.
///
/// `action` is accepted as an alias for `signal` and `ticker` for `symbol`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    #[serde(alias = "action", skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(alias = "ticker", skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_pct: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_target: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Decimal>,
}

impl TryFrom<RawSignal> for Signal {
    type Error = SignalError;

    fn try_from(raw: RawSignal) -> Result<Self, Self::Error> {
        let kind_text = raw.signal.as_deref().ok_or(SignalError::MissingField {
            field: "signal",
            kind: "any".to_string(),
        })?;
        let kind: SignalKind = kind_text.parse().map_err(SignalError::UnknownSignal)?;

        let symbol = raw
            .symbol
            .as_deref()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("symbol", kind))?;

        if let Some(confidence) = raw.confidence {
            check_confidence(confidence)?;
        }

        match kind {
            SignalKind::Hold => Ok(Signal::Hold {
                symbol,
                confidence: raw.confidence.unwrap_or(Decimal::ZERO),
            }),
            SignalKind::Close => Ok(Signal::Close {
                symbol,
                confidence: raw.confidence.unwrap_or(Decimal::ZERO),
            }),
            SignalKind::BuyToEnter | SignalKind::SellToEnter => {
                let intent = entry_intent(symbol, kind, &raw)?;
                Ok(if kind == SignalKind::BuyToEnter {
                    Signal::BuyToEnter(intent)
                } else {
                    Signal::SellToEnter(intent)
                })
            }
        }
    }
}

fn entry_intent(symbol: String, kind: SignalKind, raw: &RawSignal) -> Result<EntryIntent, SignalError> {
    let leverage = raw.leverage.ok_or_else(|| missing("leverage", kind))?;
    if leverage < Decimal::ONE {
        return Err(SignalError::OutOfRange {
            field: "leverage",
            value: leverage,
            expected: ">= 1",
        });
    }

    let sizing = match (raw.allocation_pct, raw.quantity) {
        (Some(_), Some(_)) => return Err(SignalError::AmbiguousSizing),
        (None, None) => return Err(missing("allocation_pct", kind)),
        (Some(pct), None) => {
            if pct <= Decimal::ZERO || pct > Decimal::ONE {
                return Err(SignalError::OutOfRange {
                    field: "allocation_pct",
                    value: pct,
                    expected: "within (0, 1]",
                });
            }
            Sizing::AllocationPct(pct)
        }
        (None, Some(quantity)) => {
            if quantity <= Decimal::ZERO {
                return Err(SignalError::OutOfRange {
                    field: "quantity",
                    value: quantity,
                    expected: "> 0",
                });
            }
            Sizing::Quantity(quantity)
        }
    };

    let profit_target = positive(raw.profit_target, "profit_target", kind)?;
    let stop_loss = positive(raw.stop_loss, "stop_loss", kind)?;
    let confidence = raw.confidence.ok_or_else(|| missing("confidence", kind))?;

    Ok(EntryIntent {
        symbol,
        leverage,
        sizing,
        exit_plan: ExitPlan {
            profit_target,
            stop_loss,
            invalidation_condition: raw.invalidation_condition.clone().unwrap_or_default(),
        },
        confidence,
    })
}

fn missing(field: &'static str, kind: SignalKind) -> SignalError {
    SignalError::MissingField {
        field,
        kind: kind.to_string(),
    }
}

fn positive(value: Option<Decimal>, field: &'static str, kind: SignalKind) -> Result<Decimal, SignalError> {
    let value = value.ok_or_else(|| missing(field, kind))?;
    if value <= Decimal::ZERO {
        return Err(SignalError::OutOfRange {
            field,
            value,
            expected: "> 0",
        });
    }
    Ok(value)
}

fn check_confidence(confidence: Decimal) -> Result<(), SignalError> {
    if confidence < Decimal::ZERO || confidence > Decimal::ONE {
        return Err(SignalError::OutOfRange {
            field: "confidence",
            value: confidence,
            expected: "within [0, 1]",
        });
    }
    Ok(())
}

impl From<Signal> for RawSignal {
    fn from(signal: Signal) -> Self {
        let kind = signal.kind();
        match signal {
            Signal::BuyToEnter(intent) | Signal::SellToEnter(intent) => {
                let (allocation_pct, quantity) = match intent.sizing {
                    Sizing::AllocationPct(pct) => (Some(pct), None),
                    Sizing::Quantity(qty) => (None, Some(qty)),
                };
                RawSignal {
                    signal: Some(kind.to_string()),
                    symbol: Some(intent.symbol),
                    leverage: Some(intent.leverage),
                    allocation_pct,
                    quantity,
                    profit_target: Some(intent.exit_plan.profit_target),
                    stop_loss: Some(intent.exit_plan.stop_loss),
                    invalidation_condition: Some(intent.exit_plan.invalidation_condition),
                    confidence: Some(intent.confidence),
                }
            }
            Signal::Hold { symbol, confidence } | Signal::Close { symbol, confidence } => RawSignal {
                signal: Some(kind.to_string()),
                symbol: Some(symbol),
                confidence: Some(confidence),
                ..RawSignal::default()
            },
        }
    }
}

/// Parses agent output into signals.
///
/// Accepts a single object, an array of objects, or an object wrapping the array
/// under a `signals` key. The outer `Err` is reserved for payloads that are not
/// JSON at all; every entry otherwise gets its own result so one malformed entry
/// does not discard its siblings.
pub fn parse_signals(payload: &str) -> Result<Vec<Result<Signal, SignalError>>, SignalError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| SignalError::Json(e.to_string()))?;

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("signals") {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => vec![Value::Object(map)],
        },
        other => return Err(SignalError::NotAnObject(json_type(&other).to_string())),
    };

    Ok(entries.into_iter().map(parse_entry).collect())
}

fn parse_entry(entry: Value) -> Result<Signal, SignalError> {
    if !entry.is_object() {
        return Err(SignalError::NotAnObject(json_type(&entry).to_string()));
    }
    let raw: RawSignal = serde_json::from_value(entry).map_err(|e| SignalError::Json(e.to_string()))?;
    Signal::try_from(raw)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
