use crate::error::{StateError, StateResult};
use sandbox_types::{Address, Wei, H256};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: Wei,
    pub nonce: u64,
    pub code: Vec<u8>,
    pub storage: HashMap<H256, H256>,
}

impl Account {
    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.code.is_empty() && self.balance == Wei::default()
    }
}

/// Revert point handed out by [`StateDB::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    id: u64,
    journal_len: usize,
}

impl Snapshot {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// World state operations the interpreter is written against.
pub trait StateDB {
    fn exists(&self, address: &Address) -> bool;
    fn account(&self, address: &Address) -> Option<&Account>;

    /// Inserts an empty account unless one already exists.
    fn create_account(&mut self, address: Address);

    fn balance(&self, address: &Address) -> Wei {
        self.account(address)
            .map(|account| account.balance.clone())
            .unwrap_or_default()
    }

    /// Credits `amount`, creating the account if needed.
    fn add_balance(&mut self, address: Address, amount: &Wei);
    fn sub_balance(&mut self, address: Address, amount: &Wei) -> StateResult<()>;

    fn transfer(&mut self, from: Address, to: Address, amount: &Wei) -> StateResult<()> {
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount);
        Ok(())
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map_or(0, |account| account.nonce)
    }

    fn increment_nonce(&mut self, address: Address) -> StateResult<()>;

    fn code(&self, address: &Address) -> &[u8] {
        self.account(address)
            .map(|account| account.code.as_slice())
            .unwrap_or(&[])
    }

    /// Code is write-once: setting it on an account that already has code
    /// fails.
    fn set_code(&mut self, address: Address, code: Vec<u8>) -> StateResult<()>;

    fn storage(&self, address: &Address, key: &H256) -> H256 {
        self.account(address)
            .and_then(|account| account.storage.get(key).copied())
            .unwrap_or_default()
    }

    /// Writing zero clears the slot.
    fn set_storage(&mut self, address: Address, key: H256, value: H256);

    fn transient_storage(&self, address: &Address, key: &H256) -> H256;
    fn set_transient_storage(&mut self, address: Address, key: H256, value: H256);

    /// Moves the balance of `address` to `beneficiary` and deletes the
    /// account. A self-beneficiary burns the balance.
    fn destroy_account(&mut self, address: Address, beneficiary: Address);

    fn snapshot(&mut self) -> Snapshot;

    /// Restores the state as of `snapshot`, invalidating it and every newer
    /// snapshot.
    fn revert_to_snapshot(&mut self, snapshot: Snapshot) -> StateResult<()>;

    /// Makes everything since the last commit permanent.
    fn commit(&mut self);
}

#[derive(Debug, Clone)]
enum JournalEntry {
    AccountCreated(Address),
    BalanceChanged { address: Address, previous: Wei },
    NonceChanged { address: Address, previous: u64 },
    CodeSet(Address),
    StorageChanged { address: Address, key: H256, previous: H256 },
    TransientChanged { address: Address, key: H256, previous: H256 },
    AccountDestroyed { address: Address, account: Account },
}

/// In-memory world state with an undo journal.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    accounts: HashMap<Address, Account>,
    transient: HashMap<(Address, H256), H256>,
    journal: Vec<JournalEntry>,
    snapshots: Vec<Snapshot>,
    next_snapshot_id: u64,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        if !self.accounts.contains_key(&address) {
            self.journal.push(JournalEntry::AccountCreated(address));
        }
        self.accounts.entry(address).or_default()
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::AccountCreated(address) => {
                self.accounts.remove(&address);
            }
            JournalEntry::BalanceChanged { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = previous;
                }
            }
            JournalEntry::NonceChanged { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = previous;
                }
            }
            JournalEntry::CodeSet(address) => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.code.clear();
                }
            }
            JournalEntry::StorageChanged {
                address,
                key,
                previous,
            } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    if previous.is_zero() {
                        account.storage.remove(&key);
                    } else {
                        account.storage.insert(key, previous);
                    }
                }
            }
            JournalEntry::TransientChanged {
                address,
                key,
                previous,
            } => {
                if previous.is_zero() {
                    self.transient.remove(&(address, key));
                } else {
                    self.transient.insert((address, key), previous);
                }
            }
            JournalEntry::AccountDestroyed { address, account } => {
                self.accounts.insert(address, account);
            }
        }
    }
}

impl PartialEq for WorldState {
    fn eq(&self, other: &Self) -> bool {
        self.accounts == other.accounts
    }
}

impl Eq for WorldState {}

impl StateDB for WorldState {
    fn exists(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    fn create_account(&mut self, address: Address) {
        self.account_mut(address);
    }

    fn add_balance(&mut self, address: Address, amount: &Wei) {
        let account = self.account_mut(address);
        let previous = account.balance.clone();
        account.balance += amount;
        self.journal
            .push(JournalEntry::BalanceChanged { address, previous });
    }

    fn sub_balance(&mut self, address: Address, amount: &Wei) -> StateResult<()> {
        let Some(account) = self.accounts.get_mut(&address) else {
            return if *amount == Wei::default() {
                Ok(())
            } else {
                Err(StateError::InsufficientBalance)
            };
        };
        if account.balance < *amount {
            return Err(StateError::InsufficientBalance);
        }
        let previous = account.balance.clone();
        account.balance -= amount;
        self.journal
            .push(JournalEntry::BalanceChanged { address, previous });
        Ok(())
    }

    fn increment_nonce(&mut self, address: Address) -> StateResult<()> {
        let account = self.account_mut(address);
        let previous = account.nonce;
        account.nonce = previous.checked_add(1).ok_or(StateError::NonceOverflow)?;
        self.journal
            .push(JournalEntry::NonceChanged { address, previous });
        Ok(())
    }

    fn set_code(&mut self, address: Address, code: Vec<u8>) -> StateResult<()> {
        if self.code(&address).is_empty() {
            if code.is_empty() {
                return Ok(());
            }
            self.account_mut(address).code = code;
            self.journal.push(JournalEntry::CodeSet(address));
            Ok(())
        } else {
            Err(StateError::CodeAlreadySet(address))
        }
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        let account = self.account_mut(address);
        let previous = if value.is_zero() {
            account.storage.remove(&key)
        } else {
            account.storage.insert(key, value)
        }
        .unwrap_or_default();
        self.journal.push(JournalEntry::StorageChanged {
            address,
            key,
            previous,
        });
    }

    fn transient_storage(&self, address: &Address, key: &H256) -> H256 {
        self.transient
            .get(&(*address, *key))
            .copied()
            .unwrap_or_default()
    }

    fn set_transient_storage(&mut self, address: Address, key: H256, value: H256) {
        let previous = if value.is_zero() {
            self.transient.remove(&(address, key))
        } else {
            self.transient.insert((address, key), value)
        }
        .unwrap_or_default();
        self.journal.push(JournalEntry::TransientChanged {
            address,
            key,
            previous,
        });
    }

    fn destroy_account(&mut self, address: Address, beneficiary: Address) {
        let Some(balance) = self.accounts.get(&address).map(|a| a.balance.clone()) else {
            return;
        };
        if beneficiary != address {
            self.add_balance(beneficiary, &balance);
        }
        if let Some(account) = self.accounts.remove(&address) {
            self.journal
                .push(JournalEntry::AccountDestroyed { address, account });
        }
    }

    fn snapshot(&mut self) -> Snapshot {
        let snapshot = Snapshot {
            id: self.next_snapshot_id,
            journal_len: self.journal.len(),
        };
        self.next_snapshot_id += 1;
        self.snapshots.push(snapshot);
        snapshot
    }

    fn revert_to_snapshot(&mut self, snapshot: Snapshot) -> StateResult<()> {
        let position = self
            .snapshots
            .iter()
            .rposition(|s| *s == snapshot)
            .ok_or(StateError::InvalidSnapshot(snapshot.id))?;
        self.snapshots.truncate(position);

        while self.journal.len() > snapshot.journal_len {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.journal.clear();
        self.snapshots.clear();
        self.transient.clear();
    }
}
