use ipg_common::ChainAddress;
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::MerchantEntry, traits::LedgerError};

/// Upserts one allowlist entry. `MerchantUpdated` events can flip the same pair repeatedly; the last write wins.
pub async fn set_allowed(
    intent: &ChainAddress,
    merchant: &ChainAddress,
    allowed: bool,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
            INSERT INTO merchants (intent_address, merchant, allowed) VALUES ($1, $2, $3)
            ON CONFLICT (intent_address, merchant)
            DO UPDATE SET allowed = excluded.allowed, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(intent)
    .bind(merchant)
    .bind(allowed)
    .execute(conn)
    .await?;
    trace!("🗃️ Merchant {merchant} set to allowed={allowed} for intent {intent}");
    Ok(())
}

pub async fn fetch_merchants(
    address: &ChainAddress,
    conn: &mut SqliteConnection,
) -> Result<Vec<MerchantEntry>, LedgerError> {
    let merchants = sqlx::query_as("SELECT * FROM merchants WHERE intent_address = $1 ORDER BY merchant")
        .bind(address)
        .fetch_all(conn)
        .await?;
    Ok(merchants)
}
