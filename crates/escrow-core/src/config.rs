//! # Escrow Configuration
//!
//! Policy values injected into every escrow record at creation time: the
//! arbitrator identity, the amount cap, and the deposit/fiat deadline
//! windows. Loaded from YAML, optionally overridden from the environment.
//!
//! ```yaml
//! arbitrator: "0xa4b1"
//! asset_decimals: 6
//! max_whole_units: 100
//! deposit_window_secs: 900
//! fiat_window_secs: 1800
//! ```

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::ConfigError;
use crate::identity::Address;

const DEFAULT_ASSET_DECIMALS: u8 = 6;
const DEFAULT_MAX_WHOLE_UNITS: u64 = 100;
const DEFAULT_DEPOSIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_FIAT_WINDOW_SECS: u64 = 30 * 60;
const MAX_ASSET_DECIMALS: u8 = 18;
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Escrow policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// The arbitrator identity written into every new record.
    pub arbitrator: Address,
    /// Decimals of the custody asset.
    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u8,
    /// Amount cap in whole asset units.
    #[serde(default = "default_max_whole_units")]
    pub max_whole_units: u64,
    /// Seconds after creation within which the seller must fund.
    #[serde(default = "default_deposit_window_secs")]
    pub deposit_window_secs: u64,
    /// Seconds after funding within which the buyer must confirm fiat payment.
    #[serde(default = "default_fiat_window_secs")]
    pub fiat_window_secs: u64,
}

fn default_asset_decimals() -> u8 {
    DEFAULT_ASSET_DECIMALS
}

fn default_max_whole_units() -> u64 {
    DEFAULT_MAX_WHOLE_UNITS
}

fn default_deposit_window_secs() -> u64 {
    DEFAULT_DEPOSIT_WINDOW_SECS
}

fn default_fiat_window_secs() -> u64 {
    DEFAULT_FIAT_WINDOW_SECS
}

impl EscrowConfig {
    /// Default policy with the given arbitrator.
    pub fn new(arbitrator: Address) -> Self {
        Self {
            arbitrator,
            asset_decimals: DEFAULT_ASSET_DECIMALS,
            max_whole_units: DEFAULT_MAX_WHOLE_UNITS,
            deposit_window_secs: DEFAULT_DEPOSIT_WINDOW_SECS,
            fiat_window_secs: DEFAULT_FIAT_WINDOW_SECS,
        }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a YAML config file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            arbitrator = %config.arbitrator,
            "loaded escrow config"
        );
        Ok(config)
    }

    /// Apply `ESCROW_*` environment overrides and re-validate.
    ///
    /// Recognised variables: `ESCROW_ARBITRATOR`, `ESCROW_MAX_WHOLE_UNITS`,
    /// `ESCROW_DEPOSIT_WINDOW_SECS`, `ESCROW_FIAT_WINDOW_SECS`.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `ESCROW_*` overrides read through `lookup`, then re-validate.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("ESCROW_ARBITRATOR") {
            self.arbitrator = Address::new(raw)?;
        }
        if let Some(v) = parse_env(&lookup, "ESCROW_MAX_WHOLE_UNITS")? {
            self.max_whole_units = v;
        }
        if let Some(v) = parse_env(&lookup, "ESCROW_DEPOSIT_WINDOW_SECS")? {
            self.deposit_window_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "ESCROW_FIAT_WINDOW_SECS")? {
            self.fiat_window_secs = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset_decimals > MAX_ASSET_DECIMALS {
            return Err(ConfigError::Invalid(format!(
                "asset_decimals {} exceeds {MAX_ASSET_DECIMALS}",
                self.asset_decimals
            )));
        }
        if self.max_whole_units == 0 {
            return Err(ConfigError::Invalid("max_whole_units must be positive".into()));
        }
        if Amount::from_whole(self.max_whole_units, self.asset_decimals).is_none() {
            return Err(ConfigError::Invalid(format!(
                "cap of {} units at {} decimals overflows u64",
                self.max_whole_units, self.asset_decimals
            )));
        }
        for (name, secs) in [
            ("deposit_window_secs", self.deposit_window_secs),
            ("fiat_window_secs", self.fiat_window_secs),
        ] {
            if secs == 0 || secs > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid(format!("{name} out of range: {secs}")));
            }
        }
        Ok(())
    }

    /// The inclusive amount cap in smallest units.
    ///
    /// Saturates at `u64::MAX` for unvalidated configs.
    pub fn max_amount(&self) -> Amount {
        Amount::from_whole(self.max_whole_units, self.asset_decimals)
            .unwrap_or(Amount::new(u64::MAX))
    }

    /// Deposit deadline offset from creation.
    pub fn deposit_window(&self) -> Duration {
        secs_to_duration(self.deposit_window_secs)
    }

    /// Fiat deadline offset from funding.
    pub fn fiat_window(&self) -> Duration {
        secs_to_duration(self.fiat_window_secs)
    }
}

fn parse_env(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

fn secs_to_duration(secs: u64) -> Duration {
    // Clamped so unvalidated configs cannot overflow chrono's range.
    let secs = secs.min(MAX_WINDOW_SECS) as i64;
    Duration::seconds(secs)
}
