//! Engine configuration from environment variables.

use tracing::warn;

use venueops_inventory::ConsumptionMethod;

pub const ENV_MAX_CONFLICT_RETRIES: &str = "VENUEOPS_MAX_CONFLICT_RETRIES";
pub const ENV_DEFAULT_TAX_RATE: &str = "VENUEOPS_DEFAULT_TAX_RATE";
pub const ENV_DEFAULT_CONSUMPTION: &str = "VENUEOPS_DEFAULT_CONSUMPTION";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How many times a command is re-run after a version conflict.
    pub max_conflict_retries: u32,
    /// Tax rate for new purchase orders that do not state one.
    pub default_tax_rate: f64,
    /// Consumption order when a consume request does not state one.
    pub default_consumption: ConsumptionMethod,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            default_tax_rate: 0.16,
            default_consumption: ConsumptionMethod::Fifo,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_conflict_retries = match lookup(ENV_MAX_CONFLICT_RETRIES) {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(var = ENV_MAX_CONFLICT_RETRIES, value = %raw, "invalid value, using default");
                defaults.max_conflict_retries
            }),
            None => defaults.max_conflict_retries,
        };

        let default_tax_rate = match lookup(ENV_DEFAULT_TAX_RATE) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(rate) if (0.0..=1.0).contains(&rate) => rate,
                _ => {
                    warn!(var = ENV_DEFAULT_TAX_RATE, value = %raw, "invalid value, using default");
                    defaults.default_tax_rate
                }
            },
            None => defaults.default_tax_rate,
        };

        let default_consumption = match lookup(ENV_DEFAULT_CONSUMPTION) {
            Some(raw) => raw.parse::<ConsumptionMethod>().unwrap_or_else(|_| {
                warn!(var = ENV_DEFAULT_CONSUMPTION, value = %raw, "invalid value, using default");
                defaults.default_consumption
            }),
            None => defaults.default_consumption,
        };

        Self {
            max_conflict_retries,
            default_tax_rate,
            default_consumption,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_vars_use_defaults() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn valid_vars_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_CONFLICT_RETRIES, "5"),
            (ENV_DEFAULT_TAX_RATE, "0.08"),
            (ENV_DEFAULT_CONSUMPTION, "LIFO"),
        ]));
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.default_tax_rate, 0.08);
        assert_eq!(config.default_consumption, ConsumptionMethod::Lifo);
    }

    #[test]
    fn invalid_vars_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_CONFLICT_RETRIES, "-1"),
            (ENV_DEFAULT_TAX_RATE, "16"),
            (ENV_DEFAULT_CONSUMPTION, "average"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }
}
