//! Payout Worker Binary
//!
//! Runs the withdrawal auto-process sweep on an interval: picks up pending
//! auto-process withdrawals in batches and drives each through the chain
//! transfer. A per-item failure refunds that item and never stops the loop.
//!
//! Usage:
//!   payout-worker [--interval <secs>] [--once]

use std::env;
use std::sync::Arc;

use plinko_backend::config::AppConfig;
use plinko_backend::logging;
use plinko_backend::store::Db;
use plinko_backend::ton::{self, TonapiClient};
use plinko_backend::units;
use plinko_backend::withdrawals::WithdrawalService;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Logging error: {}", e);
        std::process::exit(1);
    }

    let mut config = config;
    match ton::normalize(&config.wallet_address) {
        Ok(canonical) => config.wallet_address = canonical,
        Err(e) => {
            eprintln!("Invalid PLINKO_WALLET_ADDRESS: {}", e);
            std::process::exit(1);
        }
    }

    let mut interval_secs: u64 = 30;
    let mut run_once = false;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--interval" if i + 1 < args.len() => {
                interval_secs = args[i + 1].parse().unwrap_or(30);
                i += 2;
            }
            "--once" => {
                run_once = true;
                i += 1;
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return;
            }
            _ => i += 1,
        }
    }

    let db = match Db::new(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let ton_client = Arc::new(TonapiClient::from_config(&config));
    let service = WithdrawalService::new(db, ton_client, &config);

    println!("=== Plinko Payout Worker ===");
    println!();
    println!("Configuration:");
    println!("  Sweep Interval: {} seconds", interval_secs);
    println!("  Batch Size: {}", config.sweep_batch_size);
    println!(
        "  Auto-Process Threshold: {}",
        units::format_nano(config.withdrawal_policy.auto_process_threshold)
    );
    println!("  Confirm Timeout: {:?}", config.confirm_timeout);
    println!();
    println!("Watching for pending withdrawals...");
    println!("Press Ctrl+C to stop");
    println!();

    loop {
        match service.auto_process_batch().await {
            Ok(summary) => {
                if summary.processed_count > 0 {
                    let ok = summary.results.iter().filter(|r| r.success).count();
                    println!(
                        "[sweep] processed {} withdrawals ({} ok, {} failed)",
                        summary.processed_count,
                        ok,
                        summary.processed_count - ok
                    );
                }
            }
            Err(e) => {
                eprintln!("[sweep] Error: {}", e);
            }
        }

        if run_once {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
    }
}

fn print_usage() {
    println!("Plinko Payout Worker - Withdrawal Auto-Processor");
    println!();
    println!("Usage:");
    println!("  payout-worker [--interval <secs>]   Run the sweep loop (default: 30s)");
    println!("  payout-worker --once                Run a single sweep and exit");
    println!();
    println!("Environment:");
    println!("  PLINKO_WALLET_ADDRESS     Platform wallet address");
    println!("  PLINKO_WALLET_DAEMON_URL  Signer daemon holding the wallet key");
    println!("  PLINKO_DB_PATH            SQLite database path");
}
