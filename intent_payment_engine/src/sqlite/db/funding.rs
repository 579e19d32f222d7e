use ipg_common::ChainAddress;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{TopUp, Withdrawal},
    traits::{InsertResult, LedgerError},
};

pub async fn idempotent_insert_topup(topup: TopUp, conn: &mut SqliteConnection) -> Result<InsertResult, LedgerError> {
    match sqlx::query(
        "INSERT INTO topups (txid, intent_address, amount, block_number, timestamp) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(topup.txid.clone())
    .bind(topup.intent_address.clone())
    .bind(topup.amount)
    .bind(topup.block_number)
    .bind(topup.timestamp)
    .execute(conn)
    .await
    {
        Ok(_) => {
            debug!("🗃️ Top-up [{}] of {} recorded for intent {}", topup.txid, topup.amount, topup.intent_address);
            Ok(InsertResult::Inserted)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertResult::AlreadyExists),
        Err(e) => Err(LedgerError::from(e)),
    }
}

pub async fn fetch_topups(address: &ChainAddress, conn: &mut SqliteConnection) -> Result<Vec<TopUp>, LedgerError> {
    let topups = sqlx::query_as("SELECT * FROM topups WHERE intent_address = $1 ORDER BY block_number")
        .bind(address)
        .fetch_all(conn)
        .await?;
    Ok(topups)
}

pub async fn idempotent_insert_withdrawal(
    withdrawal: Withdrawal,
    conn: &mut SqliteConnection,
) -> Result<InsertResult, LedgerError> {
    match sqlx::query(
        r#"
            INSERT INTO withdrawals (txid, intent_address, recipient, amount, block_number, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(withdrawal.txid.clone())
    .bind(withdrawal.intent_address.clone())
    .bind(withdrawal.recipient)
    .bind(withdrawal.amount)
    .bind(withdrawal.block_number)
    .bind(withdrawal.timestamp)
    .execute(conn)
    .await
    {
        Ok(_) => {
            debug!("🗃️ Withdrawal [{}] recorded for intent {}", withdrawal.txid, withdrawal.intent_address);
            Ok(InsertResult::Inserted)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertResult::AlreadyExists),
        Err(e) => Err(LedgerError::from(e)),
    }
}

pub async fn fetch_withdrawals(
    address: &ChainAddress,
    conn: &mut SqliteConnection,
) -> Result<Vec<Withdrawal>, LedgerError> {
    let withdrawals = sqlx::query_as("SELECT * FROM withdrawals WHERE intent_address = $1 ORDER BY block_number")
        .bind(address)
        .fetch_all(conn)
        .await?;
    Ok(withdrawals)
}
