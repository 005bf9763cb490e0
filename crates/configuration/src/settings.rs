use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountSettings,
    pub simulation: Simulation,
    pub risk_management: RiskManagement,
    pub desk: DeskSettings,
}

/// How freshly provisioned accounts are funded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub initial_cash: Decimal,
    pub base_currency: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            initial_cash: dec!(10000),
            base_currency: "USD".to_string(),
        }
    }
}

/// Contains parameters for the fill simulation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Simulation {
    /// The fee charged on every fill, as a fraction of notional.
    /// 0.0005 corresponds to 0.05%.
    pub taker_fee_pct: Decimal,

    /// Share of posted margin a position may lose before it is liquidated, in (0, 1].
    pub maintenance_margin_buffer: Decimal,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            taker_fee_pct: dec!(0.0005),
            maintenance_margin_buffer: dec!(1.0),
        }
    }
}

/// Contains parameters for signal-level risk management.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskManagement {
    /// Largest fraction of available cash (before leverage) a single entry may commit.
    pub max_allocation_pct: Decimal,
    /// Orders below this notional are rejected.
    pub min_notional_usd: Decimal,
    pub max_leverage: Decimal,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            max_allocation_pct: dec!(0.4),
            min_notional_usd: dec!(10),
            max_leverage: dec!(20),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeskSettings {
    /// Capacity of the broadcast channel carrying engine events.
    pub event_buffer: usize,
    /// Most recent equity points kept per account.
    pub equity_history: usize,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            equity_history: 10_000,
        }
    }
}

impl Config {
    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let account = &self.account;
        if account.initial_cash < Decimal::ZERO {
            return Err(invalid("account.initial_cash", account.initial_cash, "must not be negative"));
        }
        if account.base_currency.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "account.base_currency must not be empty".to_string(),
            ));
        }

        let sim = &self.simulation;
        if sim.taker_fee_pct < Decimal::ZERO || sim.taker_fee_pct >= Decimal::ONE {
            return Err(invalid("simulation.taker_fee_pct", sim.taker_fee_pct, "must be in [0, 1)"));
        }
        if sim.maintenance_margin_buffer <= Decimal::ZERO || sim.maintenance_margin_buffer > Decimal::ONE {
            return Err(invalid(
                "simulation.maintenance_margin_buffer",
                sim.maintenance_margin_buffer,
                "must be in (0, 1]",
            ));
        }

        let risk = &self.risk_management;
        if risk.max_allocation_pct <= Decimal::ZERO || risk.max_allocation_pct > Decimal::ONE {
            return Err(invalid(
                "risk_management.max_allocation_pct",
                risk.max_allocation_pct,
                "must be in (0, 1]",
            ));
        }
        if risk.min_notional_usd < Decimal::ZERO {
            return Err(invalid("risk_management.min_notional_usd", risk.min_notional_usd, "must not be negative"));
        }
        if risk.max_leverage < Decimal::ONE {
            return Err(invalid("risk_management.max_leverage", risk.max_leverage, "must be at least 1"));
        }

        if self.desk.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "desk.event_buffer must be greater than zero".to_string(),
            ));
        }
        if self.desk.equity_history == 0 {
            return Err(ConfigError::ValidationError(
                "desk.equity_history must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: Decimal, rule: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{key} = {value} {rule}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.account.initial_cash, dec!(10000));
        assert_eq!(config.simulation.taker_fee_pct, dec!(0.0005));
        assert_eq!(config.risk_management.max_leverage, dec!(20));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = Config::default();
        config.simulation.maintenance_margin_buffer = dec!(1.5);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.risk_management.max_leverage = dec!(0.5);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.account.base_currency = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = Config::default();
        config.desk.event_buffer = 0;
        assert!(config.validate().is_err());
    }
}
