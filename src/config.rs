use crate::error::ZkPayError;
use crate::types::{Address, Amount, SupplyModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_NAME: &str = "ZkPay";
pub const DEFAULT_SYMBOL: &str = "ZKPAY";
pub const DEFAULT_DECIMALS: u8 = 18;
pub const DEFAULT_STATE_FILE: &str = "zkpay_ledger.json";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

/// Construction parameters for a single deployment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub initial_supply: Amount,
    #[serde(default)]
    pub initial_distribution: BTreeMap<Address, Amount>,
    #[serde(default)]
    pub supply: SupplyModel,
}

impl DeploymentConfig {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals: DEFAULT_DECIMALS,
            initial_supply: Amount::ZERO,
            initial_distribution: BTreeMap::new(),
            supply: SupplyModel::Fixed,
        }
    }

    /// Credits `amount` to `account` at genesis and grows the initial supply to match.
    pub fn with_allocation(mut self, account: Address, amount: Amount) -> Result<Self, ZkPayError> {
        let overflow = || ZkPayError::Config(format!("allocation of {} to {} overflows", amount, account));
        let supply = self.initial_supply.checked_add(amount).ok_or_else(overflow)?;
        let slot = self.initial_distribution.entry(account).or_insert(Amount::ZERO);
        *slot = slot.checked_add(amount).ok_or_else(overflow)?;
        self.initial_supply = supply;
        Ok(self)
    }

    pub fn with_minter(mut self, minter: Address) -> Self {
        self.supply = SupplyModel::Elastic { minter };
        self
    }

    /// Reads `ZKPAY_CONFIG` (a JSON file) if set, otherwise the individual `ZKPAY_*` variables.
    pub fn from_env() -> Result<Self, ZkPayError> {
        if let Ok(path) = std::env::var("ZKPAY_CONFIG") {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ZkPayError::Config(format!("{}: {}", path, e)))?;
            let cfg: DeploymentConfig = serde_json::from_str(&content)?;
            cfg.validate()?;
            return Ok(cfg);
        }

        let name = std::env::var("ZKPAY_NAME").unwrap_or_else(|_| DEFAULT_NAME.into());
        let symbol = std::env::var("ZKPAY_SYMBOL").unwrap_or_else(|_| DEFAULT_SYMBOL.into());
        let mut cfg = DeploymentConfig::new(name, symbol);

        if let Ok(d) = std::env::var("ZKPAY_DECIMALS") {
            cfg.decimals = d.parse().map_err(|e| ZkPayError::Config(format!("ZKPAY_DECIMALS: {}", e)))?;
        }

        let supply: Amount = match std::env::var("ZKPAY_INITIAL_SUPPLY") {
            Ok(s) => s.parse().map_err(|e| ZkPayError::Config(format!("ZKPAY_INITIAL_SUPPLY: {}", e)))?,
            Err(_) => Amount::ZERO,
        };
        if !supply.is_zero() {
            let deployer: Address = env_address("ZKPAY_DEPLOYER")?
                .ok_or_else(|| ZkPayError::Config("ZKPAY_INITIAL_SUPPLY requires ZKPAY_DEPLOYER".into()))?;
            cfg = cfg.with_allocation(deployer, supply)?;
        }

        if let Some(minter) = env_address("ZKPAY_MINTER")? {
            cfg = cfg.with_minter(minter);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ZkPayError> {
        if self.name.trim().is_empty() {
            return Err(ZkPayError::Config("name must not be empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(ZkPayError::Config("symbol must not be empty".into()));
        }
        if let SupplyModel::Elastic { minter } = self.supply {
            if minter.is_null() {
                return Err(ZkPayError::Config("minter must not be the null account".into()));
            }
        }

        let mut sum = Amount::ZERO;
        for (account, amount) in &self.initial_distribution {
            if account.is_null() {
                return Err(ZkPayError::Config("initial_distribution credits the null account".into()));
            }
            sum = sum
                .checked_add(*amount)
                .ok_or_else(|| ZkPayError::Config("initial_distribution overflows".into()))?;
        }
        if sum != self.initial_supply {
            return Err(ZkPayError::Config(format!(
                "initial_distribution sums to {} but initial_supply is {}",
                sum, self.initial_supply
            )));
        }
        Ok(())
    }
}

fn env_address(var: &str) -> Result<Option<Address>, ZkPayError> {
    match std::env::var(var) {
        Ok(s) => s.parse().map(Some).map_err(|e| ZkPayError::Config(format!("{}: {}", var, e))),
        Err(_) => Ok(None),
    }
}

/// Process-level settings for the HTTP dispatcher.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub state_file: Option<PathBuf>,
}

impl ServerConfig {
    /// `ZKPAY_STATE_FILE` set to an empty string disables persistence.
    pub fn from_env() -> Self {
        let bind = std::env::var("ZKPAY_BIND").unwrap_or_else(|_| DEFAULT_BIND.into());
        let state_file = match std::env::var("ZKPAY_STATE_FILE") {
            Ok(s) if s.is_empty() => None,
            Ok(s) => Some(PathBuf::from(s)),
            Err(_) => Some(PathBuf::from(DEFAULT_STATE_FILE)),
        };
        Self { bind, state_file }
    }
}
