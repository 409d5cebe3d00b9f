//! Savings Scheduler
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌───────────┐    ┌──────────┐
//! │  State   │───▶│ Transfers │───▶│  Savings  │───▶│  Output  │
//! │  (JSON)  │    │ (debits)  │    │ (accrual) │    │ JSON/CSV │
//! └──────────┘    └───────────┘    └───────────┘    └──────────┘
//! ```
//!
//! One-shot by default: load `--state`, tick once at `--date` (or now),
//! print read models and write the new state to `--out`. `--daemon` keeps
//! ticking on the configured interval instead, rewriting `--out` after
//! every tick.

use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use savings_scheduler::config::AppConfig;
use savings_scheduler::driver::TickDriver;
use savings_scheduler::info::{SavingsAccountInfo, ScheduledTransferInfo};
use savings_scheduler::ledger::JournalWriter;
use savings_scheduler::logging::init_logging;
use savings_scheduler::savings::{SavingsAccrualEngine, SavingsRepository};
use savings_scheduler::snapshot::{StateSnapshot, Stores};
use savings_scheduler::transfer::{TransferRepository, TransferScheduler};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_state_path() -> String {
    get_arg(&["--state"]).unwrap_or_else(|| "fixtures/state.json".to_string())
}

fn get_output_path() -> String {
    get_arg(&["--out"]).unwrap_or_else(|| "output/state.json".to_string())
}

/// Logical date for a one-shot run, as midnight UTC
fn get_run_time() -> Result<DateTime<Utc>> {
    match get_arg(&["--date"]) {
        None => Ok(Utc::now()),
        Some(raw) => {
            let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("Invalid --date '{}', expected YYYY-MM-DD", raw))?;
            let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
                bail!("Invalid --date '{}'", raw);
            };
            Ok(midnight.and_utc())
        }
    }
}

fn use_daemon_mode() -> bool {
    std::env::args().any(|a| a == "--daemon")
}

// ============================================================
// OUTPUT
// ============================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    as_of: NaiveDate,
    transfers: Vec<ScheduledTransferInfo>,
    savings_accounts: Vec<SavingsAccountInfo>,
}

async fn render_snapshot(stores: &Stores, config: &AppConfig, now: DateTime<Utc>) -> Result<String> {
    let decimals = config.currency_decimals;
    let transfers = stores
        .transfers
        .list()
        .await?
        .iter()
        .map(|t| ScheduledTransferInfo::project(t, decimals))
        .collect();
    let savings_accounts = stores
        .savings
        .list()
        .await?
        .iter()
        .map(|a| SavingsAccountInfo::project(a, now, config.accrual.day_count_basis, decimals))
        .collect();

    let snapshot = Snapshot {
        as_of: now.date_naive(),
        transfers,
        savings_accounts,
    };
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    info!(version = env!("BUILD_VERSION"), env = %env, "Starting savings scheduler");

    let state_path = get_state_path();
    let stores = StateSnapshot::load(&state_path)?.into_stores()?;
    info!(
        state = %state_path,
        ledger_accounts = stores.ledger.account_count(),
        transfers = stores.transfers.len(),
        savings_accounts = stores.savings.len(),
        "State loaded"
    );

    let scheduler = Arc::new(TransferScheduler::new(
        stores.ledger.clone(),
        stores.transfers.clone(),
        config.scheduler.clone(),
    ));
    let engine = Arc::new(SavingsAccrualEngine::new(
        stores.ledger.clone(),
        stores.savings.clone(),
        config.accrual.clone(),
    ));

    let mut driver = TickDriver::new(scheduler, engine, config.driver.clone());
    if let Some(journal_path) = &config.driver.journal_path {
        ensure_parent_dir(journal_path)?;
        let journal = JournalWriter::append(journal_path, config.currency_decimals)
            .with_context(|| format!("Failed to open journal {}", journal_path))?;
        driver = driver.with_journal(journal);
    }

    let out = get_output_path();
    ensure_parent_dir(&out)?;

    if use_daemon_mode() {
        let stores = &stores;
        let out = out.as_str();
        driver
            .run(move |now| async move {
                match StateSnapshot::capture(stores).await.and_then(|state| state.save(out)) {
                    Ok(()) => debug!(out, date = %now.date_naive(), "State written"),
                    Err(e) => error!(out, error = %e, "State write failed"),
                }
                ControlFlow::Continue(())
            })
            .await;
        return Ok(());
    }

    let now = get_run_time()?;
    let report = driver.tick_once(now).await?;
    let transfers = report.transfer_summary();
    let savings = report.savings_summary();
    info!(
        date = %report.date,
        transfers_executed = transfers.executed,
        transfers_already_executed = transfers.already_executed,
        transfers_rejected = transfers.rejected,
        savings_accrued = savings.accrued,
        savings_renewed = savings.renewed,
        savings_completed = savings.completed,
        savings_failed = savings.failed,
        "Run finished"
    );

    println!("{}", render_snapshot(&stores, &config, now).await?);

    StateSnapshot::capture(&stores).await?.save(&out)?;
    info!(out = %out, "State written");

    Ok(())
}
