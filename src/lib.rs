pub mod error;
pub mod types;
pub mod config;
pub mod seal;
pub mod ledger;
pub mod api;

pub use config::DeploymentConfig;
pub use error::{LedgerError, ZkPayError};
pub use ledger::{Ledger, LedgerState, SupplyControl};
pub use types::{Address, Amount, EventRecord, Notification, SupplyModel};
