//! In-memory ERC20-style token ledger.
//!
//! [`ledger::TokenLedger`] holds a fixed supply minted to its deployer, the
//! balances it has been split into and the allowances owners have granted to
//! spenders. Mutations return the event they produced or the reason they were
//! rejected; nothing is written on rejection.

pub mod address;
pub mod keys;
pub mod ledger;
pub mod scenario;
pub mod shared;

pub use address::Address;
pub use ledger::{Amount, LedgerError, LedgerEvent, TokenLedger};
pub use shared::SharedLedger;
