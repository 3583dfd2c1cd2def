use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use erc20_ledger::{
    keys::{self, AccountKey},
    ledger::{format_tokens, LedgerEvent},
    scenario::{Scenario, ScenarioReport, StepOutcome},
};

#[derive(Parser)]
#[command(name = "ledger-cli", version, about = "Run scripted operations against an ERC20-style token ledger")]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy the token described in a scenario file and apply its steps
    Run {
        file: PathBuf,
        /// Write the full JSON report (outcomes, events, final snapshot) here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Built-in walkthrough with freshly generated accounts
    Demo {
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Generate an account keypair (sk.hex, pk.hex, address.txt)
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
        /// Print address and public key as JSON
        #[arg(long)]
        json: bool,
    },
    /// Derive the ledger address of an ed25519 public key
    Address {
        #[arg(long)]
        pk_hex: String,
    },
}

//==================== output ====================//

fn describe(event: &LedgerEvent) -> String {
    match event {
        LedgerEvent::Transfer { from, to, value } => {
            format!("Transfer {from} -> {to} value={}", format_tokens(*value))
        }
        LedgerEvent::Approval {
            owner,
            spender,
            value,
        } => format!(
            "Approval {owner} -> {spender} value={}",
            format_tokens(*value)
        ),
    }
}

fn print_report(report: &ScenarioReport) {
    println!(
        "{} ({}), decimals={}, deployer={}",
        report.token.name, report.token.symbol, report.token.decimals, report.deployer
    );
    for outcome in &report.outcomes {
        match outcome {
            StepOutcome::Applied { step, op, event } => {
                println!("  [{step:>3}] {op:<18} ok    {}", describe(event));
            }
            StepOutcome::Rejected { step, op, error } => {
                println!("  [{step:>3}] {op:<18} FAIL  {error}");
            }
        }
    }
    if report.events.is_empty() {
        println!("events: none");
    } else {
        println!("events ({}):", report.events.len());
    }
    for entry in report.events.entries() {
        println!("  #{:<3} {}", entry.index, describe(&entry.event));
    }
    println!("balances:");
    for (account, balance) in &report.snapshot.balances {
        println!("  {account}  {}", format_tokens(*balance));
    }
    println!(
        "applied={} rejected={} state_root={}",
        report.applied(),
        report.rejected(),
        hex::encode(report.snapshot.state_root)
    );
}

fn write_report(report: &ScenarioReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("encode report")?;
    fs::write(path, json).with_context(|| format!("write report {}", path.display()))?;
    println!("report written → {}", path.display());
    Ok(())
}

//==================== commands ====================//

fn run_cmd(file: PathBuf, report_path: Option<PathBuf>) -> Result<()> {
    let json = fs::read_to_string(&file)
        .with_context(|| format!("read scenario {}", file.display()))?;
    let scenario = Scenario::from_json(&json)
        .with_context(|| format!("parse scenario {}", file.display()))?;
    let report = scenario.run()?;
    print_report(&report);
    if let Some(path) = report_path {
        write_report(&report, &path)?;
    }
    Ok(())
}

fn demo_cmd(report_path: Option<PathBuf>) -> Result<()> {
    let deployer = AccountKey::generate();
    let receiver = AccountKey::generate();
    let exchange = AccountKey::generate();
    let scenario =
        Scenario::walkthrough(deployer.address(), receiver.address(), exchange.address());
    let report = scenario.run()?;
    print_report(&report);
    if let Some(path) = report_path {
        write_report(&report, &path)?;
    }
    Ok(())
}

fn keygen_cmd(out_dir: PathBuf, json: bool) -> Result<()> {
    let key = AccountKey::generate();
    key.write_to(&out_dir)
        .with_context(|| format!("write keypair to {}", out_dir.display()))?;
    if json {
        println!("{}", serde_json::to_string(&key.info()).context("encode key info")?);
    } else {
        println!("{}", key.address());
        println!("keypair written → {}", out_dir.display());
    }
    Ok(())
}

fn address_cmd(pk_hex: &str) -> Result<()> {
    let address = keys::address_from_pk_hex(pk_hex)?;
    println!("{address}");
    Ok(())
}

//==================== main ====================//

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run { file, report } => run_cmd(file, report),
        Command::Demo { report } => demo_cmd(report),
        Command::Keygen { out_dir, json } => keygen_cmd(out_dir, json),
        Command::Address { pk_hex } => address_cmd(&pk_hex),
    }
}
