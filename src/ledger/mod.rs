use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::address::Address;

pub type Amount = u128;

pub const DECIMALS: u8 = 18;
pub const TOKEN_SCALE: Amount = 1_000_000_000_000_000_000; // 1 token = 1e18 base units

/// Whole tokens to base units. Cannot overflow: `u64::MAX * 1e18 < u128::MAX`.
pub fn tokens(whole: u64) -> Amount {
    Amount::from(whole) * TOKEN_SCALE
}

pub fn checked_tokens(whole: Amount) -> Option<Amount> {
    whole.checked_mul(TOKEN_SCALE)
}

/// Base units as a decimal token string, e.g. `999900` or `0.5`.
pub fn format_tokens(amount: Amount) -> String {
    let whole = amount / TOKEN_SCALE;
    let frac = amount % TOKEN_SCALE;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = DECIMALS as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("sender is the zero address")]
    InvalidSender,
    #[error("recipient is the zero address")]
    InvalidRecipient,
    #[error("spender is the zero address")]
    InvalidSpender,
    #[error("insufficient balance in {account}: have {balance}, need {needed}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        needed: Amount,
    },
    #[error("insufficient allowance for {spender} on {owner}: have {allowance}, need {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        needed: Amount,
    },
    #[error("allowance for {spender} on {owner} overflows")]
    AllowanceOverflow { owner: Address, spender: Address },
    #[error("total supply of {whole} tokens overflows base units")]
    SupplyOverflow { whole: Amount },
    #[error("balances sum to {balances} but total supply is {supply}")]
    SupplyMismatch { supply: Amount, balances: Amount },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        value: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub metadata: TokenMetadata,
    pub total_supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
    pub allowances: Vec<AllowanceEntry>,
    #[serde(with = "hex::serde")]
    pub state_root: [u8; 32],
}

/// ERC20-style ledger: fixed supply minted to the deployer, balances and
/// delegated allowances.
///
/// Every mutating operation validates fully before its first write, so a
/// rejected call leaves balances and allowances exactly as they were. The
/// returned [`LedgerEvent`] is the only record of a successful mutation.
#[derive(Clone, Debug)]
pub struct TokenLedger {
    metadata: TokenMetadata,
    deployer: Address,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
}

impl TokenLedger {
    /// `total_supply` is in whole tokens and is scaled by `10^DECIMALS`.
    pub fn new(
        deployer: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        total_supply: Amount,
    ) -> Result<Self, LedgerError> {
        if deployer.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        let supply = checked_tokens(total_supply).ok_or(LedgerError::SupplyOverflow {
            whole: total_supply,
        })?;
        let metadata = TokenMetadata {
            name: name.into(),
            symbol: symbol.into(),
            decimals: DECIMALS,
        };
        debug!(
            name = %metadata.name,
            symbol = %metadata.symbol,
            %deployer,
            supply,
            "token ledger deployed"
        );
        let mut balances = BTreeMap::new();
        balances.insert(deployer, supply);
        Ok(Self {
            metadata,
            deployer,
            total_supply: supply,
            balances,
            allowances: BTreeMap::new(),
        })
    }

    /// The mint record conventionally emitted at deployment. `new` does not
    /// emit it; observers that want it ask for it.
    pub fn genesis_event(&self) -> LedgerEvent {
        LedgerEvent::Transfer {
            from: Address::ZERO,
            to: self.deployer,
            value: self.total_supply,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn deployer(&self) -> Address {
        self.deployer
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        let outcome = self.try_transfer(from, to, amount);
        log_outcome("transfer", &outcome);
        outcome
    }

    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        let outcome = self.try_set_allowance(owner, spender, |_| Ok(amount));
        log_outcome("approve", &outcome);
        outcome
    }

    /// `spender` is the invoker moving `amount` out of `owner`'s balance.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        let outcome = self.try_transfer_from(spender, owner, to, amount);
        log_outcome("transfer_from", &outcome);
        outcome
    }

    pub fn increase_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        added: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        let outcome = self.try_set_allowance(owner, spender, |current| {
            current
                .checked_add(added)
                .ok_or(LedgerError::AllowanceOverflow { owner, spender })
        });
        log_outcome("increase_allowance", &outcome);
        outcome
    }

    pub fn decrease_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        subtracted: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        let outcome = self.try_set_allowance(owner, spender, |current| {
            current
                .checked_sub(subtracted)
                .ok_or(LedgerError::InsufficientAllowance {
                    owner,
                    spender,
                    allowance: current,
                    needed: subtracted,
                })
        });
        log_outcome("decrease_allowance", &outcome);
        outcome
    }

    pub fn total_balances(&self) -> Amount {
        self.balances.values().sum()
    }

    pub fn check_invariant(&self) -> Result<(), LedgerError> {
        let balances = self.total_balances();
        if balances != self.total_supply {
            return Err(LedgerError::SupplyMismatch {
                supply: self.total_supply,
                balances,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            metadata: self.metadata.clone(),
            total_supply: self.total_supply,
            balances: self.balances.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
            state_root: compute_state_root(
                &self.metadata,
                self.total_supply,
                &self.balances,
                &self.allowances,
            ),
        }
    }

    fn try_transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        if from.is_zero() {
            return Err(LedgerError::InvalidSender);
        }
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        self.ensure_balance(&from, amount)?;
        self.move_balance(from, to, amount);
        Ok(LedgerEvent::Transfer {
            from,
            to,
            value: amount,
        })
    }

    fn try_transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidSender);
        }
        if spender.is_zero() {
            return Err(LedgerError::InvalidSpender);
        }
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        self.ensure_balance(&owner, amount)?;
        let allowance = self.allowance(&owner, &spender);
        if amount > allowance {
            return Err(LedgerError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                needed: amount,
            });
        }
        self.move_balance(owner, to, amount);
        self.allowances.insert((owner, spender), allowance - amount);
        Ok(LedgerEvent::Transfer {
            from: owner,
            to,
            value: amount,
        })
    }

    fn try_set_allowance<F>(
        &mut self,
        owner: Address,
        spender: Address,
        next: F,
    ) -> Result<LedgerEvent, LedgerError>
    where
        F: FnOnce(Amount) -> Result<Amount, LedgerError>,
    {
        if owner.is_zero() {
            return Err(LedgerError::InvalidSender);
        }
        if spender.is_zero() {
            return Err(LedgerError::InvalidSpender);
        }
        let value = next(self.allowance(&owner, &spender))?;
        self.allowances.insert((owner, spender), value);
        Ok(LedgerEvent::Approval {
            owner,
            spender,
            value,
        })
    }

    fn ensure_balance(&self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if amount > balance {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                balance,
                needed: amount,
            });
        }
        Ok(())
    }

    // Caller must have checked `from` holds at least `amount`.
    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) {
        *self.balances.entry(from).or_default() -= amount;
        *self.balances.entry(to).or_default() += amount;
    }
}

fn log_outcome(operation: &'static str, outcome: &Result<LedgerEvent, LedgerError>) {
    match outcome {
        Ok(event) => debug!(operation, ?event, "ledger mutation applied"),
        Err(err) => warn!(operation, %err, "ledger mutation rejected"),
    }
}

fn compute_state_root(
    metadata: &TokenMetadata,
    total_supply: Amount,
    balances: &BTreeMap<Address, Amount>,
    allowances: &BTreeMap<(Address, Address), Amount>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    let mut hasher = Sha256::new();
    hasher.update(b"erc20-meta");
    hasher.update((metadata.name.len() as u64).to_le_bytes());
    hasher.update(metadata.name.as_bytes());
    hasher.update((metadata.symbol.len() as u64).to_le_bytes());
    hasher.update(metadata.symbol.as_bytes());
    hasher.update([metadata.decimals]);
    hasher.update(total_supply.to_le_bytes());
    leaves.push(hasher.finalize().into());
    for (account, balance) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"erc20-balance");
        hasher.update(account.as_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for ((owner, spender), amount) in allowances {
        let mut hasher = Sha256::new();
        hasher.update(b"erc20-allowance");
        hasher.update(owner.as_bytes());
        hasher.update(spender.as_bytes());
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

/// Binary SHA-256 tree over `leaves`. An unpaired node is promoted to the
/// next level unchanged, so `[a, b, c]` and `[a, b, c, c]` get different roots.
/// The metadata leaf is always present, so the tree is never empty.
fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        leaves = leaves
            .chunks(2)
            .map(|pair| {
                if let [left, right] = pair {
                    let mut hasher = Sha256::new();
                    hasher.update(b"erc20-node");
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                } else {
                    pair[0]
                }
            })
            .collect();
    }
    leaves.first().copied().unwrap_or_default()
}
