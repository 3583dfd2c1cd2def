use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::ledger::{Amount, LedgerError, LedgerEvent, LedgerSnapshot, TokenLedger};

/// Cloneable handle to one ledger. Each call holds the lock for its whole
/// duration, so concurrent callers never interleave the balance and
/// allowance writes of a single operation.
#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<Mutex<TokenLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: TokenLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.inner.lock().transfer(from, to, amount)
    }

    pub fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.inner.lock().approve(owner, spender, amount)
    }

    pub fn transfer_from(
        &self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.inner.lock().transfer_from(spender, owner, to, amount)
    }

    pub fn increase_allowance(
        &self,
        owner: Address,
        spender: Address,
        added: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.inner.lock().increase_allowance(owner, spender, added)
    }

    pub fn decrease_allowance(
        &self,
        owner: Address,
        spender: Address,
        subtracted: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        self.inner.lock().decrease_allowance(owner, spender, subtracted)
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.inner.lock().balance_of(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.inner.lock().allowance(owner, spender)
    }

    pub fn total_supply(&self) -> Amount {
        self.inner.lock().total_supply()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Runs `f` with exclusive access, for reads that must see one consistent state.
    pub fn with<R>(&self, f: impl FnOnce(&TokenLedger) -> R) -> R {
        f(&self.inner.lock())
    }
}
