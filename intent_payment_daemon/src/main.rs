mod config;
mod errors;

use dotenvy::dotenv;
use intent_payment_engine::{
    chain::{RpcChainReader, RpcContractReader},
    events::EventProducers,
    indexer::{start_indexer_worker, EventIndexer, IndexerSettings},
    SqliteDatabase,
};
use log::*;

use crate::{config::DaemonConfig, errors::DaemonError};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = DaemonConfig::from_env_or_default();

    info!("🚀️ Starting the intent payment daemon");
    match run_daemon(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

async fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let factory = config
        .factory_address
        .clone()
        .ok_or_else(|| DaemonError::ConfigurationError("IPG_FACTORY_ADDRESS must be set".to_string()))?;

    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections).await?;
    if config.skip_migrations {
        warn!("🚀️ Skipping ledger migrations on request (IPG_SKIP_MIGRATIONS)");
    } else {
        db.run_migrations().await?;
    }

    let reader = RpcChainReader::new(&config.rpc_url)?;
    let contracts = RpcContractReader::new(&config.rpc_url, &factory)?;
    let settings = IndexerSettings::new(factory).with_catchup_window(config.catchup_window);
    let indexer = EventIndexer::new(db, reader, contracts, settings, EventProducers::default());

    let worker = start_indexer_worker(indexer, config.poll_interval);
    info!("🚀️ Indexer is mirroring intents from {}", config.rpc_url);

    tokio::signal::ctrl_c().await.ok();
    info!("🚀️ Shutdown signal received; stopping the indexer worker");
    worker.abort();
    Ok(())
}
