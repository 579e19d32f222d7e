use ipg_common::ChainAddress;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::Revocation,
    traits::{InsertResult, LedgerError},
};

pub async fn idempotent_insert(
    revocation: Revocation,
    conn: &mut SqliteConnection,
) -> Result<InsertResult, LedgerError> {
    match sqlx::query(
        r#"
            INSERT INTO revocations (txid, intent_address, revoked_by, reason, block_number, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(revocation.txid.clone())
    .bind(revocation.intent_address.clone())
    .bind(revocation.revoked_by)
    .bind(revocation.reason)
    .bind(revocation.block_number)
    .bind(revocation.timestamp)
    .execute(conn)
    .await
    {
        Ok(_) => {
            debug!("🗃️ Revocation [{}] recorded for intent {}", revocation.txid, revocation.intent_address);
            Ok(InsertResult::Inserted)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertResult::AlreadyExists),
        Err(e) => Err(LedgerError::from(e)),
    }
}

pub async fn fetch_revocations(
    address: &ChainAddress,
    conn: &mut SqliteConnection,
) -> Result<Vec<Revocation>, LedgerError> {
    let revocations = sqlx::query_as("SELECT * FROM revocations WHERE intent_address = $1 ORDER BY block_number")
        .bind(address)
        .fetch_all(conn)
        .await?;
    Ok(revocations)
}
