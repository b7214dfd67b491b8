//! Pipeline configuration loading and validation.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::execution::EngineConfig;
use crate::gate::GateConfig;
use crate::risk::{RiskConfig, TradingWindow};
use crate::scheduler::SchedulerConfig;

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// The parsed values are out of range.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level configuration for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Account the risk engine tracks.
    #[serde(default = "default_account_id")]
    pub account_id: String,
    /// Risk engine limits.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Execution engine limits.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Order manager tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Gate settings.
    #[serde(default)]
    pub gate: GateConfig,
}

fn default_account_id() -> String {
    "default".to_string()
}

impl PipelineConfig {
    /// Load from a YAML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                let config: Self = serde_yaml_bw::from_str(&raw)?;
                info!(path = %path.display(), "configuration loaded");
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Range-check every limit; called by [`Self::load`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pct_fields = [
            ("risk.max_risk_per_trade_pct", self.risk.max_risk_per_trade_pct),
            ("risk.max_position_size_pct", self.risk.max_position_size_pct),
            ("risk.max_daily_loss_pct", self.risk.max_daily_loss_pct),
            ("risk.max_drawdown_pct", self.risk.max_drawdown_pct),
            ("engine.max_daily_loss_pct", self.engine.max_daily_loss_pct),
            (
                "engine.max_position_value_pct",
                self.engine.max_position_value_pct,
            ),
        ];
        for (name, value) in pct_fields {
            if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(ConfigError::Validation(format!(
                    "{name} must be in (0, 100], got {value}"
                )));
            }
        }

        if self.risk.max_leverage == 0 {
            return Err(ConfigError::Validation(
                "risk.max_leverage must be at least 1".to_string(),
            ));
        }
        if self.engine.initial_balance <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "engine.initial_balance must be positive".to_string(),
            ));
        }
        if self.scheduler.max_queue_size == 0 || self.scheduler.max_orders_per_symbol == 0 {
            return Err(ConfigError::Validation(
                "scheduler queue limits must be at least 1".to_string(),
            ));
        }
        if self.scheduler.processing_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "scheduler.processing_interval_ms must be at least 1".to_string(),
            ));
        }

        for raw in &self.risk.allowed_trading_hours {
            TradingWindow::parse(raw).map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::TradingMode;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.account_id, "default");
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => panic!("temp file: {e}"),
        };
        let yaml = "\
account_id: live-1
risk:
  max_leverage: 5
  max_drawdown_pct: 15
engine:
  initial_balance: 25000
gate:
  mode: AI_FULL_AUTO
";
        match file.write_all(yaml.as_bytes()) {
            Ok(()) => {}
            Err(e) => panic!("write temp config: {e}"),
        }

        let config = match PipelineConfig::load(Some(file.path())) {
            Ok(c) => c,
            Err(e) => panic!("config should load: {e}"),
        };
        assert_eq!(config.account_id, "live-1");
        assert_eq!(config.risk.max_leverage, 5);
        assert_eq!(config.risk.max_drawdown_pct, dec!(15));
        assert_eq!(config.engine.initial_balance, dec!(25000));
        assert_eq!(config.gate.mode, TradingMode::AiFullAuto);
        // Untouched sections keep their defaults.
        assert_eq!(config.scheduler.max_queue_size, 100);
    }

    #[test]
    fn test_out_of_range_percentage_rejected() {
        let mut config = PipelineConfig::default();
        config.risk.max_drawdown_pct = dec!(150);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_trading_window_rejected() {
        let mut config = PipelineConfig::default();
        config.risk.allowed_trading_hours = vec!["9-17".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result = PipelineConfig::load(Some(Path::new("/nonexistent/pipeline.yaml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
