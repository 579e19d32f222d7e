//! Ledger-store semantics: idempotent inserts, cursor monotonicity, derived-status queries and pagination.

use chrono::{Duration, Utc};
use intent_payment_engine::{
    db_types::{LifecycleStatus, NewIntent, NewReceipt},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{LedgerDatabase, LedgerError, LedgerQueries, Pagination},
    IntentQueryApi,
    IntentQueryFilter,
    SqliteDatabase,
};
use ipg_common::{ChainAddress, TokenAmount};
use sqlx::{migrate::MigrateDatabase, Sqlite};

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        log::error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

fn new_intent(address: &str, payer: &str, agent: &str, hours_left: i64, block: i64) -> NewIntent {
    let now = Utc::now();
    NewIntent {
        address: ChainAddress::from(address),
        payer: ChainAddress::from(payer),
        agent: ChainAddress::from(agent),
        token: ChainAddress::from("0x00000000000000000000000000000000000000ad"),
        total_cap: TokenAmount::from(1000),
        per_tx_cap: TokenAmount::from(100),
        spent: TokenAmount::from(0),
        start_time: now - Duration::hours(48),
        end_time: now + Duration::hours(hours_left),
        metadata_uri: None,
        created_tx: format!("0xcrea{block}"),
        created_block: block,
    }
}

fn new_receipt(txid: &str, intent: &str, amount: i64, block: i64) -> NewReceipt {
    NewReceipt {
        txid: txid.to_string(),
        intent_address: ChainAddress::from(intent),
        merchant: ChainAddress::from("0x00000000000000000000000000000000000000ac"),
        amount: TokenAmount::from(amount),
        token: ChainAddress::from("0x00000000000000000000000000000000000000ad"),
        receipt_hash: format!("0xhash{block}"),
        receipt_uri: format!("memory://t{block}"),
        timestamp: Utc::now(),
        block_number: block,
        gas_used: 21_000,
    }
}

const INTENT_A: &str = "0x1000000000000000000000000000000000000001";
const INTENT_B: &str = "0x1000000000000000000000000000000000000002";
const INTENT_C: &str = "0x1000000000000000000000000000000000000003";
const PAYER_1: &str = "0x00000000000000000000000000000000000000aa";
const PAYER_2: &str = "0x00000000000000000000000000000000000000bb";
const AGENT_1: &str = "0x00000000000000000000000000000000000000ab";

#[tokio::test]
async fn duplicate_inserts_are_no_ops() {
    let db = setup().await;
    assert!(db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap().was_inserted());
    assert!(!db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap().was_inserted());

    assert!(db.record_receipt(new_receipt("0xexec1", INTENT_A, 40, 103)).await.unwrap().was_inserted());
    assert!(!db.record_receipt(new_receipt("0xexec1", INTENT_A, 40, 103)).await.unwrap().was_inserted());
    assert_eq!(db.receipt_count(&ChainAddress::from(INTENT_A)).await.unwrap(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn the_cursor_never_goes_backwards() {
    let db = setup().await;
    assert_eq!(db.fetch_cursor().await.unwrap(), None);
    db.advance_cursor(105).await.unwrap();
    assert_eq!(db.fetch_cursor().await.unwrap(), Some(105));

    // Re-committing the same tip is allowed; regression is refused.
    db.advance_cursor(105).await.unwrap();
    let err = db.advance_cursor(90).await.unwrap_err();
    assert!(matches!(err, LedgerError::CursorRegression { current: 105, requested: 90 }));
    assert_eq!(db.fetch_cursor().await.unwrap(), Some(105));

    db.advance_cursor(110).await.unwrap();
    assert_eq!(db.fetch_cursor().await.unwrap(), Some(110));
    tear_down(db).await;
}

#[tokio::test]
async fn receipts_page_newest_first() {
    let db = setup().await;
    db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap();
    for block in 101..=105 {
        db.record_receipt(new_receipt(&format!("0xexec{block}"), INTENT_A, 10, block)).await.unwrap();
    }
    let address = ChainAddress::from(INTENT_A);
    let page = db.receipts_for_intent(&address, Pagination::new(0, 2)).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].block_number, 105);
    assert_eq!(page.items[1].block_number, 104);
    assert!(!page.is_last_page());

    let last = db.receipts_for_intent(&address, Pagination::new(4, 2)).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].block_number, 101);
    assert!(last.is_last_page());
    tear_down(db).await;
}

#[tokio::test]
async fn status_filters_match_the_derived_lifecycle() {
    let db = setup().await;
    // A: active, B: already past its end time (stored Active, derived Expired), C: different payer.
    db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap();
    db.upsert_intent(new_intent(INTENT_B, PAYER_1, AGENT_1, -1, 101)).await.unwrap();
    db.upsert_intent(new_intent(INTENT_C, PAYER_2, AGENT_1, 24, 102)).await.unwrap();

    let api = IntentQueryApi::new(db.clone());
    let payer = ChainAddress::from(PAYER_1);

    let all = api.intents_for_payer(&payer, None, Pagination::default()).await.unwrap();
    assert_eq!(all.total, 2);
    // Newest first by creation block.
    assert_eq!(all.items[0].address, ChainAddress::from(INTENT_B));

    let active =
        api.intents_for_payer(&payer, Some(vec![LifecycleStatus::Active]), Pagination::default()).await.unwrap();
    assert_eq!(active.total, 1);
    assert_eq!(active.items[0].address, ChainAddress::from(INTENT_A));

    let expired =
        api.intents_for_payer(&payer, Some(vec![LifecycleStatus::Expired]), Pagination::default()).await.unwrap();
    assert_eq!(expired.total, 1);
    assert_eq!(expired.items[0].address, ChainAddress::from(INTENT_B));

    let agent_view = api
        .intents_for_agent(&ChainAddress::from(AGENT_1), None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(agent_view.total, 3);
    tear_down(db).await;
}

#[tokio::test]
async fn search_filters_compose() {
    let db = setup().await;
    db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap();
    db.upsert_intent(new_intent(INTENT_B, PAYER_1, AGENT_1, 24, 200)).await.unwrap();
    db.upsert_intent(new_intent(INTENT_C, PAYER_2, AGENT_1, 24, 300)).await.unwrap();

    let filter = IntentQueryFilter::default()
        .with_payer(ChainAddress::from(PAYER_1))
        .created_after_block(150)
        .with_status(LifecycleStatus::Active);
    let page = db.search_intents(filter).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].address, ChainAddress::from(INTENT_B));
    tear_down(db).await;
}

#[tokio::test]
async fn the_summary_folds_rows_and_derives_expiry() {
    let db = setup().await;
    let address = ChainAddress::from(INTENT_A);
    db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap();
    db.record_receipt(new_receipt("0xexec1", INTENT_A, 40, 103)).await.unwrap();
    db.record_receipt(new_receipt("0xexec2", INTENT_A, 25, 104)).await.unwrap();
    db.update_spent(&address, TokenAmount::from(65)).await.unwrap();

    let api = IntentQueryApi::new(db.clone());
    let view = api.intent_summary(&address).await.unwrap().expect("summary missing");
    assert_eq!(view.spent, TokenAmount::from(65));
    assert_eq!(view.remaining_cap, TokenAmount::from(935));
    assert_eq!(view.receipt_count, 2);
    assert_eq!(view.status, LifecycleStatus::Active);
    assert!(!view.merchant_restricted);

    // The same rows, viewed from after the end time, derive Expired without any write having happened.
    let later = Utc::now() + Duration::hours(25);
    let view = api.intent_summary_at(&address, later).await.unwrap().unwrap();
    assert_eq!(view.status, LifecycleStatus::Expired);
    tear_down(db).await;
}

#[tokio::test]
async fn spent_above_the_cap_is_refused_by_the_schema() {
    let db = setup().await;
    let address = ChainAddress::from(INTENT_A);
    db.upsert_intent(new_intent(INTENT_A, PAYER_1, AGENT_1, 24, 100)).await.unwrap();
    db.update_spent(&address, TokenAmount::from(1000)).await.unwrap();
    let err = db.update_spent(&address, TokenAmount::from(1001)).await;
    assert!(err.is_err(), "spent may never exceed the total cap");
    let row = db.fetch_intent(&address).await.unwrap().unwrap();
    assert_eq!(row.spent, TokenAmount::from(1000));
    tear_down(db).await;
}
