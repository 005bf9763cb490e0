use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{AccountSettings, Config, DeskSettings, RiskManagement, Simulation};

/// Prefix for environment overrides, e.g. `PAPER_DESK__SIMULATION__TAKER_FEE_PCT`.
pub const ENV_PREFIX: &str = "PAPER_DESK";

/// Loads the application configuration from `config.toml` in the working directory.
///
/// The file is optional; missing keys fall back to their defaults and any key can be
/// overridden from the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    build(config::File::with_name("config.toml").required(false))
}

/// Loads the application configuration from an explicit TOML file, which must exist.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    build(config::File::from(path).format(config::FileFormat::Toml))
}

fn build<S>(file: S) -> Result<Config, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    tracing::debug!(
        initial_cash = %config.account.initial_cash,
        fee = %config.simulation.taker_fee_pct,
        max_leverage = %config.risk_management.max_leverage,
        "Configuration loaded"
    );
    Ok(config)
}

/// Parses configuration from TOML text without consulting the environment.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [account]
            initial_cash = 2500

            [risk_management]
            max_leverage = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.account.initial_cash, dec!(2500));
        assert_eq!(config.account.base_currency, "USD");
        assert_eq!(config.risk_management.max_leverage, dec!(10));
        assert_eq!(config.risk_management.max_allocation_pct, dec!(0.4));
        assert_eq!(config.simulation.taker_fee_pct, dec!(0.0005));
    }

    #[test]
    fn invalid_values_fail_to_load() {
        let result = parse_config(
            r#"
            [simulation]
            taker_fee_pct = 1.5
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
