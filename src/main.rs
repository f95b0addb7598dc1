//! Plinko Settlement API Server
//!
//! Serves the bet/withdrawal/deposit/Stars settlement endpoints.
//!
//! Usage:
//!   plinko-api [--port <port>]
//!
//! Configuration comes from PLINKO_* environment variables; see config.rs.

use std::env;
use std::sync::Arc;

use plinko_backend::api::AppState;
use plinko_backend::config::{AppConfig, Network};
use plinko_backend::logging;
use plinko_backend::store::Db;
use plinko_backend::telegram::BotApiClient;
use plinko_backend::ton::TonapiClient;
use plinko_backend::{api, ton};

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

    if config.network == Network::Mainnet {
        if let Err(e) = config.validate_for_production() {
            eprintln!("Production validation failed: {}", e);
            std::process::exit(1);
        }
    }

    // the platform wallet address is stored and compared in canonical form
    let mut config = config;
    match ton::normalize(&config.wallet_address) {
        Ok(canonical) => config.wallet_address = canonical,
        Err(e) => {
            eprintln!("Invalid PLINKO_WALLET_ADDRESS: {}", e);
            std::process::exit(1);
        }
    }

    config.print_summary();

    let mut port = config.api_port;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port = args[i + 1].parse().unwrap_or(port);
                i += 2;
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
    let telegram_client = Arc::new(BotApiClient::from_config(&config));

    let state = AppState::new(db, ton_client, telegram_client, &config);

    if let Err(e) = api::start_server(state, port).await {
        eprintln!("API server error: {}", e);
        std::process::exit(1);
    }
}
