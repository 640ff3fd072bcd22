//! Movement of staked value between participants and the shared vault.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CustodyError;
use crate::types::ParticipantId;

pub trait Custody: Send + Sync {
    /// Moves `amount` from the participant into the vault.
    fn deposit(&mut self, from: &ParticipantId, amount: u64) -> Result<(), CustodyError>;

    /// Moves `amount` out of the vault to the participant.
    fn withdraw(&mut self, to: &ParticipantId, amount: u64) -> Result<(), CustodyError>;

    fn vault_balance(&self) -> u64;
}

#[derive(Debug, Default)]
struct Balances {
    wallets: HashMap<ParticipantId, u64>,
    vault: u64,
}

impl Balances {
    fn merge(&mut self, amount: u64) -> Result<(), CustodyError> {
        self.vault = self
            .vault
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Overflow("vault".to_string()))?;
        Ok(())
    }

    fn extract(&mut self, amount: u64) -> Result<u64, CustodyError> {
        if amount > self.vault {
            return Err(CustodyError::InsufficientVault {
                available: self.vault,
                required: amount,
            });
        }
        self.vault -= amount;
        Ok(amount)
    }
}

/// Wallets and vault held in memory. Clones share the same balances, so a
/// test can keep a handle after moving one into the market.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    inner: Arc<Mutex<Balances>>,
}

impl InMemoryCustody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `amount` already held in the vault, as when resuming a
    /// saved ledger whose stakes are still owed.
    #[must_use]
    pub fn with_vault(amount: u64) -> Self {
        let custody = Self::default();
        custody.inner.lock().vault = amount;
        custody
    }

    /// Adds funds to a wallet from outside the system.
    pub fn credit(&self, participant: &ParticipantId, amount: u64) {
        let mut balances = self.inner.lock();
        let wallet = balances.wallets.entry(participant.clone()).or_insert(0);
        *wallet = wallet.saturating_add(amount);
    }

    #[must_use]
    pub fn balance_of(&self, participant: &ParticipantId) -> u64 {
        self.inner
            .lock()
            .wallets
            .get(participant)
            .copied()
            .unwrap_or(0)
    }
}

impl Custody for InMemoryCustody {
    fn deposit(&mut self, from: &ParticipantId, amount: u64) -> Result<(), CustodyError> {
        let mut balances = self.inner.lock();
        let available = balances.wallets.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                participant: from.to_string(),
                available,
                required: amount,
            });
        }
        balances.merge(amount)?;
        balances.wallets.insert(from.clone(), available - amount);
        Ok(())
    }

    fn withdraw(&mut self, to: &ParticipantId, amount: u64) -> Result<(), CustodyError> {
        let mut balances = self.inner.lock();
        let current = balances.wallets.get(to).copied().unwrap_or(0);
        let credited = current
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Overflow(to.to_string()))?;
        balances.extract(amount)?;
        balances.wallets.insert(to.clone(), credited);
        Ok(())
    }

    fn vault_balance(&self) -> u64 {
        self.inner.lock().vault
    }
}
