//! End-to-end indexing cycles against a scripted chain and a throwaway SQLite ledger.

use intent_payment_engine::{
    db_types::IntentStatus,
    events::EventProducers,
    indexer::{EventIndexer, IndexerSettings},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        ContractIntentConfig,
        MemoryChainReader,
        MemoryContracts,
    },
    traits::{
        EventPayload,
        ExecutedEvent,
        IntentCreatedEvent,
        LedgerDatabase,
        LedgerQueries,
        MerchantUpdatedEvent,
        RevokedEvent,
        ToppedUpEvent,
    },
    SqliteDatabase,
};
use ipg_common::{ChainAddress, TokenAmount};
use sqlx::{migrate::MigrateDatabase, Sqlite};

fn factory() -> ChainAddress {
    ChainAddress::from("0xfac7000000000000000000000000000000000001")
}

fn payer() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000aa")
}

fn agent() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000ab")
}

fn merchant() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000ac")
}

fn token() -> ChainAddress {
    ChainAddress::from("0x00000000000000000000000000000000000000ad")
}

fn intent_address() -> ChainAddress {
    ChainAddress::from("0x1000000000000000000000000000000000000001")
}

struct Fixture {
    db: SqliteDatabase,
    reader: MemoryChainReader,
    contracts: MemoryContracts,
    indexer: EventIndexer<SqliteDatabase, MemoryChainReader, MemoryContracts>,
}

async fn setup() -> Fixture {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let reader = MemoryChainReader::new();
    let contracts = MemoryContracts::new(agent());
    let settings = IndexerSettings::new(factory());
    let indexer =
        EventIndexer::new(db.clone(), reader.clone(), contracts.clone(), settings, EventProducers::default());
    Fixture { db, reader, contracts, indexer }
}

async fn tear_down(mut fixture: Fixture) {
    let url = fixture.db.url().to_string();
    if let Err(e) = fixture.db.close().await {
        log::error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

fn created_event() -> EventPayload {
    EventPayload::IntentCreated(IntentCreatedEvent {
        payer: payer(),
        intent: intent_address(),
        agent: agent(),
        salt: "0x01".to_string(),
    })
}

fn executed_event(amount: i64) -> EventPayload {
    EventPayload::Executed(ExecutedEvent {
        agent: agent(),
        merchant: merchant(),
        token: token(),
        amount: TokenAmount::from(amount),
        receipt_hash: "0xhash01".to_string(),
        receipt_uri: "memory://transcript-1".to_string(),
    })
}

#[tokio::test]
async fn discovers_intents_and_records_receipts() {
    let fixture = setup().await;
    let intent = intent_address();
    fixture.contracts.add_intent(
        ContractIntentConfig::new(intent.clone(), payer(), agent(), token())
            .with_balance(500)
            .with_merchants(vec![(merchant(), true)]),
    );
    fixture.reader.push_event(&factory(), 100, "0xcrea1", created_event());
    fixture.reader.push_event(&intent, 103, "0xexec1", executed_event(40));
    fixture.contracts.set_spent(&intent, TokenAmount::from(40));
    fixture.reader.set_tip(105);

    let outcome = fixture.indexer.poll_once().await.expect("cycle failed");
    assert_eq!(outcome.range, Some((0, 105)));
    assert_eq!(outcome.intents_discovered, 1);
    assert_eq!(outcome.receipts_recorded, 1);

    let row = fixture.db.fetch_intent(&intent).await.unwrap().expect("intent not mirrored");
    assert_eq!(row.payer, payer());
    assert_eq!(row.agent, agent());
    assert_eq!(row.spent, TokenAmount::from(40), "spent must come from the authoritative contract read");
    assert_eq!(row.status, IntentStatus::Active);
    assert!(row.spent <= row.total_cap);

    // The creation-time merchant list was mirrored along with the intent.
    let merchants = fixture.db.merchants_for_intent(&intent).await.unwrap();
    assert_eq!(merchants.len(), 1);
    assert!(merchants[0].allowed);

    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(105));
    tear_down(fixture).await;
}

#[tokio::test]
async fn replaying_a_range_changes_nothing() {
    let fixture = setup().await;
    let intent = intent_address();
    fixture.contracts.add_intent(
        ContractIntentConfig::new(intent.clone(), payer(), agent(), token()).with_balance(500),
    );
    fixture.reader.push_event(&factory(), 100, "0xcrea1", created_event());
    fixture.reader.push_event(&intent, 103, "0xexec1", executed_event(40));
    fixture.contracts.set_spent(&intent, TokenAmount::from(40));
    fixture.reader.set_tip(105);
    fixture.indexer.poll_once().await.expect("first cycle failed");
    let count_after_first = fixture.db.receipt_count(&intent).await.unwrap();

    // Simulate a crash where the cycle's writes landed but the cursor write was lost: the next cycle re-scans the
    // whole range and must leave the ledger exactly as it was.
    sqlx::query("UPDATE indexer_cursor SET last_block = 0 WHERE id = 1")
        .execute(fixture.db.pool())
        .await
        .unwrap();
    let outcome = fixture.indexer.poll_once().await.expect("replay cycle failed");
    assert_eq!(outcome.intents_discovered, 0, "replayed intent creation must be a no-op");
    assert_eq!(outcome.receipts_recorded, 0, "replayed receipts must be no-ops");
    assert_eq!(fixture.db.receipt_count(&intent).await.unwrap(), count_after_first);
    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(105));
    tear_down(fixture).await;
}

#[tokio::test]
async fn failed_cycle_leaves_cursor_and_retries_the_range() {
    let fixture = setup().await;
    let intent = intent_address();
    fixture.contracts.add_intent(
        ContractIntentConfig::new(intent.clone(), payer(), agent(), token()).with_balance(500),
    );
    fixture.reader.push_event(&factory(), 100, "0xcrea1", created_event());
    fixture.reader.set_tip(105);
    fixture.indexer.poll_once().await.expect("bootstrap cycle failed");
    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(105));

    // New events land, but the endpoint goes down mid-catch-up.
    fixture.reader.push_event(&intent, 108, "0xexec2", executed_event(25));
    fixture.contracts.set_spent(&intent, TokenAmount::from(25));
    fixture.reader.set_tip(110);
    fixture.reader.set_unavailable(true);
    let err = fixture.indexer.poll_once().await;
    assert!(err.is_err(), "an RPC outage must abort the cycle");
    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(105), "a failed cycle must not move the cursor");
    assert_eq!(fixture.db.receipt_count(&intent).await.unwrap(), 0);

    // Next tick: same range, this time it goes through.
    fixture.reader.set_unavailable(false);
    let outcome = fixture.indexer.poll_once().await.expect("retry cycle failed");
    assert_eq!(outcome.range, Some((106, 110)));
    assert_eq!(outcome.receipts_recorded, 1);
    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(110));
    tear_down(fixture).await;
}

#[tokio::test]
async fn catchup_window_bounds_the_scan() {
    let fixture = setup().await;
    // An intent created far behind the tip falls outside the 1000-block window and is never discovered.
    fixture.reader.push_event(&factory(), 100, "0xcrea1", created_event());
    fixture.reader.set_tip(5000);

    let outcome = fixture.indexer.poll_once().await.expect("cycle failed");
    assert_eq!(outcome.range, Some((4000, 5000)));
    assert_eq!(outcome.intents_discovered, 0);
    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(5000));
    tear_down(fixture).await;
}

#[tokio::test]
async fn revocation_is_terminal_and_idempotent() {
    let fixture = setup().await;
    let intent = intent_address();
    fixture.contracts.add_intent(
        ContractIntentConfig::new(intent.clone(), payer(), agent(), token()).with_balance(100),
    );
    fixture.reader.push_event(&factory(), 100, "0xcrea1", created_event());
    fixture.reader.push_event(
        &intent,
        104,
        "0xrevo1",
        EventPayload::Revoked(RevokedEvent { by: payer(), reason: "budget withdrawn".to_string() }),
    );
    fixture.reader.set_tip(105);
    let outcome = fixture.indexer.poll_once().await.expect("cycle failed");
    assert_eq!(outcome.revocations_recorded, 1);

    let row = fixture.db.fetch_intent(&intent).await.unwrap().unwrap();
    assert_eq!(row.status, IntentStatus::Revoked);
    let revocations = fixture.db.revocations_for_intent(&intent).await.unwrap();
    assert_eq!(revocations.len(), 1);
    assert_eq!(revocations[0].reason.as_deref(), Some("budget withdrawn"));

    // Replay of the same revocation is a no-op.
    sqlx::query("UPDATE indexer_cursor SET last_block = 0 WHERE id = 1")
        .execute(fixture.db.pool())
        .await
        .unwrap();
    let outcome = fixture.indexer.poll_once().await.expect("replay cycle failed");
    assert_eq!(outcome.revocations_recorded, 0);
    assert_eq!(fixture.db.revocations_for_intent(&intent).await.unwrap().len(), 1);
    tear_down(fixture).await;
}

#[tokio::test]
async fn merchant_updates_and_topups_are_folded() {
    let fixture = setup().await;
    let intent = intent_address();
    fixture.contracts.add_intent(
        ContractIntentConfig::new(intent.clone(), payer(), agent(), token()).with_balance(100),
    );
    fixture.reader.push_event(&factory(), 100, "0xcrea1", created_event());
    fixture.reader.push_event(
        &intent,
        102,
        "0xtopu1",
        EventPayload::ToppedUp(ToppedUpEvent { amount: TokenAmount::from(250) }),
    );
    fixture.reader.push_event(
        &intent,
        103,
        "0xmerc1",
        EventPayload::MerchantUpdated(MerchantUpdatedEvent { merchant: merchant(), allowed: true }),
    );
    fixture.reader.push_event(
        &intent,
        104,
        "0xmerc2",
        EventPayload::MerchantUpdated(MerchantUpdatedEvent { merchant: merchant(), allowed: false }),
    );
    fixture.reader.set_tip(105);
    let outcome = fixture.indexer.poll_once().await.expect("cycle failed");
    assert_eq!(outcome.topups_recorded, 1);
    assert_eq!(outcome.merchant_updates, 2);

    let topups = fixture.db.topups_for_intent(&intent).await.unwrap();
    assert_eq!(topups.len(), 1);
    assert_eq!(topups[0].amount, TokenAmount::from(250));

    // Both updates applied in block-then-log order; the later one wins.
    let merchants = fixture.db.merchants_for_intent(&intent).await.unwrap();
    assert_eq!(merchants.len(), 1);
    assert!(!merchants[0].allowed);
    tear_down(fixture).await;
}

#[tokio::test]
async fn reentrant_ticks_are_skipped_not_queued() {
    let fixture = setup().await;
    fixture.reader.set_tip(10);
    // Two handles to the same indexer share the Idle/Processing guard; with the first cycle artificially held open
    // there is no async way to wedge poll_once from a test, so exercise the guard directly through concurrency.
    let a = fixture.indexer.clone();
    let b = fixture.indexer.clone();
    let (ra, rb) = tokio::join!(a.poll_once(), b.poll_once());
    let outcomes = [ra.unwrap(), rb.unwrap()];
    let skipped = outcomes.iter().filter(|o| o.skipped).count();
    // At most one of the two concurrent ticks may have done work; a skipped tick does nothing at all.
    assert!(skipped <= 1);
    assert_eq!(fixture.db.fetch_cursor().await.unwrap(), Some(10));
    tear_down(fixture).await;
}
