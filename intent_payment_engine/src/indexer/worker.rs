use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;

use super::EventIndexer;
use crate::traits::{ChainReader, ContractReader, LedgerDatabase, LedgerQueries};

/// Starts the indexer worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The timer is the only thing that moves the indexer from Idle to Processing. A tick that lands while a cycle is
/// still running is dropped by the guard inside [`EventIndexer::poll_once`]; failed cycles leave the cursor where
/// it was and the next tick retries the same range.
pub fn start_indexer_worker<DB, R, C>(indexer: EventIndexer<DB, R, C>, poll_interval: Duration) -> JoinHandle<()>
where
    DB: LedgerDatabase + LedgerQueries + 'static,
    R: ChainReader + 'static,
    C: ContractReader + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(poll_interval);
        info!("🔎️ Event indexer worker started (polling every {poll_interval:?})");
        loop {
            timer.tick().await;
            match indexer.poll_once().await {
                Ok(outcome) if outcome.skipped => {
                    debug!("🔎️ Tick skipped: the previous cycle is still processing");
                },
                Ok(_) => {},
                Err(e) => {
                    error!("🔎️ Indexing cycle failed: {e}. The cursor is unchanged and the range will be retried.");
                },
            }
        }
    })
}
