use std::{env, time::Duration};

use ipg_common::{parse_boolean_flag, ChainAddress};
use log::*;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_CATCHUP_WINDOW: u64 = 1000;
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub database_url: String,
    pub rpc_url: String,
    /// The factory contract announcing new intents. Required; there is no sensible default.
    pub factory_address: Option<ChainAddress>,
    pub poll_interval: Duration,
    /// How far behind the tip a cycle will reach. Events older than this are dropped, not recovered.
    pub catchup_window: u64,
    pub max_db_connections: u32,
    /// When true, startup will not apply outstanding schema migrations.
    pub skip_migrations: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            factory_address: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            catchup_window: DEFAULT_CATCHUP_WINDOW,
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            skip_migrations: false,
        }
    }
}

impl DaemonConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = intent_payment_engine::db_url();
        let rpc_url = env::var("IPG_RPC_URL").ok().unwrap_or_else(|| {
            info!("🪛️ IPG_RPC_URL is not set. Using the default, {DEFAULT_RPC_URL}.");
            DEFAULT_RPC_URL.into()
        });
        let factory_address = env::var("IPG_FACTORY_ADDRESS").ok().map(ChainAddress::from);
        let poll_interval = env::var("IPG_POLL_INTERVAL_SECS")
            .map(|s| {
                s.parse::<u64>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for IPG_POLL_INTERVAL_SECS. {e} Using the default, \
                         {DEFAULT_POLL_INTERVAL_SECS}, instead."
                    );
                    DEFAULT_POLL_INTERVAL_SECS
                })
            })
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        let catchup_window = env::var("IPG_CATCHUP_WINDOW")
            .map(|s| {
                s.parse::<u64>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for IPG_CATCHUP_WINDOW. {e} Using the default, \
                         {DEFAULT_CATCHUP_WINDOW}, instead."
                    );
                    DEFAULT_CATCHUP_WINDOW
                })
            })
            .unwrap_or(DEFAULT_CATCHUP_WINDOW);
        let max_db_connections = env::var("IPG_MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_DB_CONNECTIONS);
        let skip_migrations = parse_boolean_flag(env::var("IPG_SKIP_MIGRATIONS").ok(), false);
        Self {
            database_url,
            rpc_url,
            factory_address,
            poll_interval,
            catchup_window,
            max_db_connections,
            skip_migrations,
        }
    }
}
