//! Scripted runs against a freshly deployed ledger.
//!
//! A [`Scenario`] names the token, a table of account aliases and a list of
//! [`Step`]s. Running it deploys a [`TokenLedger`], applies every step in
//! order and collects what the ledger reported: each emitted event goes into
//! the [`EventLog`], each rejection becomes a [`StepOutcome::Rejected`].
//! Rejections do not stop the run; unresolvable account references do.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, info_span};

use crate::address::{Address, AddressError};
use crate::ledger::{
    checked_tokens, Amount, LedgerError, LedgerEvent, LedgerSnapshot, TokenLedger, TokenMetadata,
};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown account reference {0:?}")]
    UnknownAccount(String),
    #[error("bad address {reference:?}: {source}")]
    BadAddress {
        reference: String,
        #[source]
        source: AddressError,
    },
    #[error("step {step}: amount {amount} overflows base units")]
    AmountOverflow { step: usize, amount: Amount },
    #[error("deployment failed: {0}")]
    Deploy(#[source] LedgerError),
    #[error("supply invariant broken after step {step}: {source}")]
    Invariant {
        step: usize,
        #[source]
        source: LedgerError,
    },
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// Whole tokens, scaled by `10^decimals`.
    #[default]
    Tokens,
    /// Base units, used as given.
    Raw,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    /// Whole tokens.
    pub total_supply: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Transfer {
        from: String,
        to: String,
        amount: Amount,
    },
    Approve {
        owner: String,
        spender: String,
        amount: Amount,
    },
    TransferFrom {
        spender: String,
        owner: String,
        to: String,
        amount: Amount,
    },
    IncreaseAllowance {
        owner: String,
        spender: String,
        amount: Amount,
    },
    DecreaseAllowance {
        owner: String,
        spender: String,
        amount: Amount,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Transfer { .. } => "transfer",
            Step::Approve { .. } => "approve",
            Step::TransferFrom { .. } => "transfer_from",
            Step::IncreaseAllowance { .. } => "increase_allowance",
            Step::DecreaseAllowance { .. } => "decrease_allowance",
        }
    }

    fn amount(&self) -> Amount {
        match self {
            Step::Transfer { amount, .. }
            | Step::Approve { amount, .. }
            | Step::TransferFrom { amount, .. }
            | Step::IncreaseAllowance { amount, .. }
            | Step::DecreaseAllowance { amount, .. } => *amount,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub token: TokenConfig,
    #[serde(default)]
    pub accounts: BTreeMap<String, Address>,
    /// Alias or `0x` address of the deploying account.
    pub deployer: String,
    #[serde(default)]
    pub units: Units,
    /// Record the deployment mint as the first event.
    #[serde(default = "default_true")]
    pub record_genesis: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LoggedEvent {
    pub index: usize,
    /// `None` for the genesis mint.
    pub step: Option<usize>,
    pub event: LedgerEvent,
}

/// Append-only collector for events returned by the ledger.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Option<usize>, event: LedgerEvent) {
        let index = self.entries.len();
        self.entries.push(LoggedEvent { index, step, event });
    }

    pub fn entries(&self) -> &[LoggedEvent] {
        &self.entries
    }

    pub fn events(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.entries.iter().map(|e| &e.event)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn serialize_display<S: Serializer>(err: &LedgerError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(err)
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied {
        step: usize,
        op: &'static str,
        event: LedgerEvent,
    },
    Rejected {
        step: usize,
        op: &'static str,
        #[serde(serialize_with = "serialize_display")]
        error: LedgerError,
    },
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied { .. })
    }

    pub fn error(&self) -> Option<&LedgerError> {
        match self {
            StepOutcome::Applied { .. } => None,
            StepOutcome::Rejected { error, .. } => Some(error),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ScenarioReport {
    pub token: TokenMetadata,
    pub deployer: Address,
    pub outcomes: Vec<StepOutcome>,
    pub events: EventLog,
    pub snapshot: LedgerSnapshot,
}

impl ScenarioReport {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.applied()
    }
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Walkthrough of deployment, transfer, approve and delegated transfer,
    /// including the rejections each of them is expected to produce.
    pub fn walkthrough(deployer: Address, receiver: Address, exchange: Address) -> Self {
        let accounts = BTreeMap::from([
            ("deployer".to_string(), deployer),
            ("receiver".to_string(), receiver),
            ("exchange".to_string(), exchange),
            ("zero".to_string(), Address::ZERO),
        ]);
        let s = |v: &str| v.to_string();
        Self {
            token: TokenConfig {
                name: s("Night^^Stalker"),
                symbol: s("N^^S"),
                total_supply: 1_000_000,
            },
            accounts,
            deployer: s("deployer"),
            units: Units::Tokens,
            record_genesis: true,
            steps: vec![
                Step::Transfer {
                    from: s("deployer"),
                    to: s("receiver"),
                    amount: 100,
                },
                Step::Transfer {
                    from: s("deployer"),
                    to: s("receiver"),
                    amount: 100_000_000,
                },
                Step::Transfer {
                    from: s("deployer"),
                    to: s("zero"),
                    amount: 100,
                },
                Step::Approve {
                    owner: s("deployer"),
                    spender: s("exchange"),
                    amount: 100,
                },
                Step::Approve {
                    owner: s("deployer"),
                    spender: s("zero"),
                    amount: 100,
                },
                Step::TransferFrom {
                    spender: s("exchange"),
                    owner: s("deployer"),
                    to: s("receiver"),
                    amount: 100,
                },
                Step::TransferFrom {
                    spender: s("exchange"),
                    owner: s("deployer"),
                    to: s("receiver"),
                    amount: 100_000_000,
                },
            ],
        }
    }

    pub fn resolve(&self, reference: &str) -> Result<Address, ScenarioError> {
        if let Some(address) = self.accounts.get(reference) {
            return Ok(*address);
        }
        if reference.starts_with("0x") || reference.starts_with("0X") {
            return reference
                .parse()
                .map_err(|source| ScenarioError::BadAddress {
                    reference: reference.to_string(),
                    source,
                });
        }
        Err(ScenarioError::UnknownAccount(reference.to_string()))
    }

    pub fn deploy(&self) -> Result<TokenLedger, ScenarioError> {
        let deployer = self.resolve(&self.deployer)?;
        TokenLedger::new(
            deployer,
            self.token.name.clone(),
            self.token.symbol.clone(),
            self.token.total_supply,
        )
        .map_err(ScenarioError::Deploy)
    }

    pub fn run(&self) -> Result<ScenarioReport, ScenarioError> {
        let span = info_span!("scenario", token = %self.token.symbol);
        let _guard = span.enter();

        let mut ledger = self.deploy()?;
        let mut events = EventLog::new();
        if self.record_genesis {
            events.record(None, ledger.genesis_event());
        }

        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (idx, step) in self.steps.iter().enumerate() {
            let outcome = match self.apply(&mut ledger, idx, step)? {
                Ok(event) => {
                    events.record(Some(idx), event.clone());
                    StepOutcome::Applied {
                        step: idx,
                        op: step.name(),
                        event,
                    }
                }
                Err(error) => StepOutcome::Rejected {
                    step: idx,
                    op: step.name(),
                    error,
                },
            };
            ledger
                .check_invariant()
                .map_err(|source| ScenarioError::Invariant { step: idx, source })?;
            outcomes.push(outcome);
        }

        let report = ScenarioReport {
            token: ledger.metadata().clone(),
            deployer: ledger.deployer(),
            outcomes,
            events,
            snapshot: ledger.snapshot(),
        };
        info!(
            steps = report.outcomes.len(),
            applied = report.applied(),
            rejected = report.rejected(),
            "scenario finished"
        );
        Ok(report)
    }

    fn scale(&self, step: usize, amount: Amount) -> Result<Amount, ScenarioError> {
        match self.units {
            Units::Tokens => {
                checked_tokens(amount).ok_or(ScenarioError::AmountOverflow { step, amount })
            }
            Units::Raw => Ok(amount),
        }
    }

    /// Outer error aborts the run; inner error is a ledger rejection.
    fn apply(
        &self,
        ledger: &mut TokenLedger,
        idx: usize,
        step: &Step,
    ) -> Result<Result<LedgerEvent, LedgerError>, ScenarioError> {
        let amount = self.scale(idx, step.amount())?;
        let outcome = match step {
            Step::Transfer { from, to, .. } => {
                ledger.transfer(self.resolve(from)?, self.resolve(to)?, amount)
            }
            Step::Approve { owner, spender, .. } => {
                ledger.approve(self.resolve(owner)?, self.resolve(spender)?, amount)
            }
            Step::TransferFrom {
                spender, owner, to, ..
            } => ledger.transfer_from(
                self.resolve(spender)?,
                self.resolve(owner)?,
                self.resolve(to)?,
                amount,
            ),
            Step::IncreaseAllowance { owner, spender, .. } => {
                ledger.increase_allowance(self.resolve(owner)?, self.resolve(spender)?, amount)
            }
            Step::DecreaseAllowance { owner, spender, .. } => {
                ledger.decrease_allowance(self.resolve(owner)?, self.resolve(spender)?, amount)
            }
        };
        Ok(outcome)
    }
}
