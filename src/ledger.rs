use crate::config::DeploymentConfig;
use crate::error::{LedgerError, ZkPayError};
use crate::seal::{self, ExecMeta, KeyMaterial};
use crate::types::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs::File, path::PathBuf};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub meta: Meta,
    pub total_supply: Amount,
    #[serde(default)]
    pub balances: BTreeMap<Address, Amount>,
    #[serde(default)]
    pub allowances: BTreeMap<Address, BTreeMap<Address, Amount>>, // owner -> spender -> cap
    #[serde(default)]
    pub journal: Vec<EventRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Meta {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub supply: SupplyModel,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub total_supply: Amount,
    pub accounts: usize,
    pub journal_len: usize,
    pub head_hash: Option<Hash>,
}

impl LedgerState {
    /// Fresh state for `config`, plus the mint notifications for the genesis allocations.
    pub fn genesis(config: &DeploymentConfig) -> Result<(Self, Vec<Notification>), ZkPayError> {
        config.validate()?;
        let mut st = LedgerState {
            meta: Meta {
                name: config.name.clone(),
                symbol: config.symbol.clone(),
                decimals: config.decimals,
                supply: config.supply,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
            ..Default::default()
        };
        let mut notes = Vec::with_capacity(config.initial_distribution.len());
        for (account, amount) in &config.initial_distribution {
            notes.push(st.mint(*account, *amount)?);
        }
        Ok((st, notes))
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    pub fn allowance_of(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    // --------------------------
    // Invariant audit
    // --------------------------
    pub fn audit(&self) -> Result<(), ZkPayError> {
        let mut sum = Amount::ZERO;
        for (account, balance) in &self.balances {
            if account.is_null() {
                return Err(ZkPayError::State("null_account_holds_balance".into()));
            }
            if balance.is_zero() {
                return Err(ZkPayError::State(format!("zero_balance_entry: {}", account)));
            }
            sum = sum
                .checked_add(*balance)
                .ok_or_else(|| ZkPayError::State("balance_sum_overflow".into()))?;
        }
        if sum != self.total_supply {
            return Err(ZkPayError::State(format!(
                "supply_mismatch: balances sum to {} but total_supply is {}",
                sum, self.total_supply
            )));
        }
        for (owner, spenders) in &self.allowances {
            if spenders.is_empty() {
                return Err(ZkPayError::State(format!("empty_allowance_table: {}", owner)));
            }
            for (spender, cap) in spenders {
                if owner.is_null() || spender.is_null() {
                    return Err(ZkPayError::State("null_account_in_allowance".into()));
                }
                if cap.is_zero() {
                    return Err(ZkPayError::State(format!("zero_allowance_entry: {} -> {}", owner, spender)));
                }
            }
        }
        Ok(())
    }

    // --------------------------
    // Mutations (all-or-nothing: every check runs before the first write)
    // --------------------------
    pub(crate) fn transfer(&mut self, sender: Address, recipient: Address, amount: Amount) -> Result<Notification, LedgerError> {
        if recipient.is_null() {
            return Err(LedgerError::InvalidRecipient(recipient));
        }
        self.move_balance(sender, recipient, amount)?;
        Ok(Notification::Transfer { from: sender, to: recipient, value: amount })
    }

    pub(crate) fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<Notification, LedgerError> {
        if spender.is_null() || owner.is_null() {
            return Err(LedgerError::InvalidSpender(Address::NULL));
        }
        self.write_allowance(owner, spender, amount);
        Ok(Notification::Approval { owner, spender, value: amount })
    }

    pub(crate) fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<Notification, LedgerError> {
        if recipient.is_null() {
            return Err(LedgerError::InvalidRecipient(recipient));
        }
        let remaining = self.remaining_allowance(owner, spender, amount)?;
        self.move_balance(owner, recipient, amount)?;
        self.write_allowance(owner, spender, remaining);
        Ok(Notification::Transfer { from: owner, to: recipient, value: amount })
    }

    pub(crate) fn mint(&mut self, recipient: Address, amount: Amount) -> Result<Notification, LedgerError> {
        if recipient.is_null() {
            return Err(LedgerError::InvalidRecipient(recipient));
        }
        let supply = self.total_supply.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        let credited = self.balance_of(&recipient).checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        self.write_balance(recipient, credited);
        self.total_supply = supply;
        Ok(Notification::Transfer { from: Address::NULL, to: recipient, value: amount })
    }

    pub(crate) fn burn(&mut self, account: Address, amount: Amount) -> Result<Notification, LedgerError> {
        let debited = self.debit(account, amount)?;
        let supply = self.total_supply.checked_sub(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        self.write_balance(account, debited);
        self.total_supply = supply;
        Ok(Notification::Transfer { from: account, to: Address::NULL, value: amount })
    }

    pub(crate) fn burn_from(&mut self, spender: Address, owner: Address, amount: Amount) -> Result<Notification, LedgerError> {
        let remaining = self.remaining_allowance(owner, spender, amount)?;
        let note = self.burn(owner, amount)?;
        self.write_allowance(owner, spender, remaining);
        Ok(note)
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        let debited = self.debit(from, amount)?;
        if from == to {
            return Ok(());
        }
        let credited = self.balance_of(&to).checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        self.write_balance(from, debited);
        self.write_balance(to, credited);
        Ok(())
    }

    /// Balance `account` would be left with after paying `amount`. The null account funds nothing.
    fn debit(&self, account: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let available = self.balance_of(&account);
        let insufficient = LedgerError::InsufficientBalance { account, available, required: amount };
        if account.is_null() {
            return Err(insufficient);
        }
        available.checked_sub(amount).ok_or(insufficient)
    }

    fn remaining_allowance(&self, owner: Address, spender: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let available = self.allowance_of(&owner, &spender);
        available.checked_sub(amount).ok_or(LedgerError::InsufficientAllowance {
            owner,
            spender,
            available,
            required: amount,
        })
    }

    fn write_balance(&mut self, account: Address, value: Amount) {
        if value.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, value);
        }
    }

    fn write_allowance(&mut self, owner: Address, spender: Address, value: Amount) {
        if value.is_zero() {
            if let Some(spenders) = self.allowances.get_mut(&owner) {
                spenders.remove(&spender);
                if spenders.is_empty() {
                    self.allowances.remove(&owner);
                }
            }
        } else {
            self.allowances.entry(owner).or_default().insert(spender, value);
        }
    }

    fn append(&mut self, notification: Notification, meta: &ExecMeta, keys: &KeyMaterial) -> EventRecord {
        let record = seal::seal(self.journal.len() as u64, self.journal.last(), notification, meta, keys);
        self.journal.push(record.clone());
        record
    }
}

/// Shared handle over one deployment's token state.
///
/// Every mutation holds the write guard across check, update and journal append,
/// so concurrent callers behave as if serialized.
pub struct Ledger {
    state: RwLock<LedgerState>,
    keys: KeyMaterial,
    events: broadcast::Sender<EventRecord>,
    store: Option<PathBuf>,
    commit_gate: Mutex<()>,
}

impl Ledger {
    pub fn new(config: &DeploymentConfig, keys: KeyMaterial) -> Result<Self, ZkPayError> {
        let (mut state, genesis) = LedgerState::genesis(config)?;
        let meta = ExecMeta::now();
        for note in genesis {
            state.append(note, &meta, &keys);
        }
        info!(
            name = %state.meta.name,
            symbol = %state.meta.symbol,
            total_supply = %state.total_supply,
            "Ledger created"
        );
        Ok(Self::from_state(state, keys))
    }

    /// Restores from `store` when the file exists, otherwise runs genesis. Later commits go to `store`.
    pub fn open(config: &DeploymentConfig, keys: KeyMaterial, store: Option<PathBuf>) -> Result<Self, ZkPayError> {
        let ledger = match &store {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|e| ZkPayError::LedgerIo(e.to_string()))?;
                let state: LedgerState = serde_json::from_str(&content)?;
                if state.meta.name != config.name
                    || state.meta.symbol != config.symbol
                    || state.meta.decimals != config.decimals
                {
                    return Err(ZkPayError::Config(format!(
                        "state file {} belongs to {}/{} (decimals {}), not {}/{} (decimals {})",
                        path.display(),
                        state.meta.name,
                        state.meta.symbol,
                        state.meta.decimals,
                        config.name,
                        config.symbol,
                        config.decimals
                    )));
                }
                if state.meta.supply != config.supply {
                    return Err(ZkPayError::Config(format!(
                        "state file {} has supply model {:?}, config asks for {:?}",
                        path.display(),
                        state.meta.supply,
                        config.supply
                    )));
                }
                state.audit()?;
                seal::verify_chain(&state.journal, &keys).map_err(ZkPayError::State)?;
                info!(
                    path = %path.display(),
                    journal_len = state.journal.len(),
                    "Ledger restored"
                );
                Self::from_state(state, keys)
            }
            _ => Self::new(config, keys)?,
        };
        Ok(Self { store, ..ledger })
    }

    fn from_state(state: LedgerState, keys: KeyMaterial) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { state: RwLock::new(state), keys, events, store: None, commit_gate: Mutex::new(()) }
    }

    // --------------------------
    // Observers
    // --------------------------
    pub fn name(&self) -> String {
        self.state.read().meta.name.clone()
    }

    pub fn symbol(&self) -> String {
        self.state.read().meta.symbol.clone()
    }

    pub fn decimals(&self) -> u8 {
        self.state.read().meta.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.state.read().total_supply
    }

    pub fn supply_model(&self) -> SupplyModel {
        self.state.read().meta.supply
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.state.read().balance_of(account)
    }

    pub fn allowance_of(&self, owner: &Address, spender: &Address) -> Amount {
        self.state.read().allowance_of(owner, spender)
    }

    /// Point-in-time copy of the whole state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }

    /// Journal records with `seq > after`, or the whole journal.
    pub fn events_after(&self, after: Option<u64>) -> Vec<EventRecord> {
        let st = self.state.read();
        let start = match after {
            Some(a) => usize::try_from(a).map_or(st.journal.len(), |a| a.saturating_add(1)),
            None => 0,
        };
        st.journal.get(start..).map(|s| s.to_vec()).unwrap_or_default()
    }

    /// Live feed of records appended from now on, in journal order.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    pub fn audit(&self) -> Result<AuditReport, ZkPayError> {
        let st = self.state.read();
        st.audit()?;
        seal::verify_chain(&st.journal, &self.keys).map_err(ZkPayError::State)?;
        Ok(AuditReport {
            total_supply: st.total_supply,
            accounts: st.balances.len(),
            journal_len: st.journal.len(),
            head_hash: st.journal.last().map(|r| r.record_hash.clone()),
        })
    }

    // --------------------------
    // Mutations
    // --------------------------
    pub fn transfer(&self, sender: Address, recipient: Address, amount: Amount) -> Result<EventRecord, LedgerError> {
        self.mutate("transfer", |st| st.transfer(sender, recipient, amount))
    }

    pub fn approve(&self, owner: Address, spender: Address, amount: Amount) -> Result<EventRecord, LedgerError> {
        self.mutate("approve", |st| st.approve(owner, spender, amount))
    }

    pub fn transfer_from(
        &self,
        spender: Address,
        owner: Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<EventRecord, LedgerError> {
        self.mutate("transfer_from", |st| st.transfer_from(spender, owner, recipient, amount))
    }

    /// Mint/burn capability. `None` for fixed-supply deployments.
    pub fn supply_control(&self) -> Option<SupplyControl<'_>> {
        match self.supply_model() {
            SupplyModel::Elastic { minter } => Some(SupplyControl { ledger: self, minter }),
            SupplyModel::Fixed => None,
        }
    }

    fn mutate<F>(&self, op: &'static str, f: F) -> Result<EventRecord, LedgerError>
    where
        F: FnOnce(&mut LedgerState) -> Result<Notification, LedgerError>,
    {
        let mut st = self.state.write();
        let notification = match f(&mut st) {
            Ok(n) => n,
            Err(e) => {
                warn!(op, code = e.code(), error = %e, "Rejected");
                return Err(e);
            }
        };
        let record = st.append(notification, &ExecMeta::now(), &self.keys);
        // No receivers is fine.
        let _ = self.events.send(record.clone());
        drop(st);

        info!(op, seq = record.seq, tx = %record.tx_id, "Applied");
        Ok(record)
    }

    // --------------------------
    // Persistence
    // --------------------------
    /// Writes the current state to the store atomically. No-op without a store.
    pub async fn commit(&self) -> Result<(), ZkPayError> {
        let path = match &self.store {
            Some(p) => p.clone(),
            None => return Ok(()),
        };
        let _gate = self.commit_gate.lock().await;

        let snapshot = self.snapshot();
        let json_str = serde_json::to_string_pretty(&snapshot)?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp_file = PathBuf::from(tmp);
        tokio::fs::write(&tmp_file, json_str).await.map_err(|e| ZkPayError::LedgerIo(e.to_string()))?;

        { // fsync tmp
            let f = File::open(&tmp_file).map_err(|e| ZkPayError::LedgerIo(e.to_string()))?;
            f.sync_all().map_err(|e| ZkPayError::LedgerIo(e.to_string()))?;
        }

        tokio::fs::rename(&tmp_file, &path).await.map_err(|e| ZkPayError::LedgerIo(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) { let _ = dir.sync_all(); }
        }
        Ok(())
    }
}

/// Mint/burn operations of a supply-elastic deployment.
pub struct SupplyControl<'a> {
    ledger: &'a Ledger,
    minter: Address,
}

impl<'a> SupplyControl<'a> {
    /// Account the dispatcher allows to call `mint`.
    pub fn minter(&self) -> Address {
        self.minter
    }

    pub fn mint(&self, recipient: Address, amount: Amount) -> Result<EventRecord, LedgerError> {
        self.ledger.mutate("mint", |st| st.mint(recipient, amount))
    }

    pub fn burn(&self, account: Address, amount: Amount) -> Result<EventRecord, LedgerError> {
        self.ledger.mutate("burn", |st| st.burn(account, amount))
    }

    pub fn burn_from(&self, spender: Address, owner: Address, amount: Amount) -> Result<EventRecord, LedgerError> {
        self.ledger.mutate("burn_from", |st| st.burn_from(spender, owner, amount))
    }
}
