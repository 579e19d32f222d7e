use ipg_common::ChainAddress;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewReceipt, Receipt},
    traits::{InsertResult, LedgerError, Paged, Pagination},
};

/// Insert-or-ignore keyed by transaction id. Replaying a block range feeds the same receipts through here again;
/// the unique key makes that harmless.
pub async fn idempotent_insert(receipt: NewReceipt, conn: &mut SqliteConnection) -> Result<InsertResult, LedgerError> {
    match sqlx::query(
        r#"
            INSERT INTO receipts (
                txid, intent_address, merchant, amount, token,
                receipt_hash, receipt_uri, timestamp, block_number, gas_used
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(receipt.txid.clone())
    .bind(receipt.intent_address.clone())
    .bind(receipt.merchant)
    .bind(receipt.amount)
    .bind(receipt.token)
    .bind(receipt.receipt_hash)
    .bind(receipt.receipt_uri)
    .bind(receipt.timestamp)
    .bind(receipt.block_number)
    .bind(receipt.gas_used)
    .execute(conn)
    .await
    {
        Ok(_) => {
            debug!("🗃️ Receipt [{}] recorded against intent {}", receipt.txid, receipt.intent_address);
            Ok(InsertResult::Inserted)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertResult::AlreadyExists),
        Err(e) => Err(LedgerError::from(e)),
    }
}

pub async fn fetch_receipt(txid: &str, conn: &mut SqliteConnection) -> Result<Option<Receipt>, LedgerError> {
    let receipt =
        sqlx::query_as("SELECT * FROM receipts WHERE txid = $1").bind(txid).fetch_optional(conn).await?;
    Ok(receipt)
}

/// Receipts for one intent, newest first.
pub async fn fetch_receipts(
    address: &ChainAddress,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Paged<Receipt>, LedgerError> {
    let total = count_receipts(address, conn).await?;
    let receipts = sqlx::query_as(
        r#"
            SELECT * FROM receipts WHERE intent_address = $1
            ORDER BY block_number DESC, txid DESC
            LIMIT $2 OFFSET $3
        "#,
    )
    .bind(address)
    .bind(pagination.limit)
    .bind(pagination.offset)
    .fetch_all(conn)
    .await?;
    Ok(Paged::new(receipts, total, pagination))
}

pub async fn count_receipts(address: &ChainAddress, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE intent_address = $1")
        .bind(address)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
