use sqlx::SqliteConnection;

use crate::{db_types::IndexerCursor, traits::LedgerError};

/// The highest fully-processed block, or `None` before the first successful cycle.
pub async fn fetch_cursor(conn: &mut SqliteConnection) -> Result<Option<u64>, LedgerError> {
    let row: Option<IndexerCursor> =
        sqlx::query_as("SELECT last_block, updated_at FROM indexer_cursor WHERE id = 1").fetch_optional(conn).await?;
    Ok(row.map(|r| r.last_block as u64))
}

/// Moves the cursor forward. The guarded upsert refuses to move it backwards; re-committing the same block is
/// allowed, since a cycle whose range collapsed to a no-op still records its tip.
pub async fn advance_cursor(block: u64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let requested = block as i64;
    let res = sqlx::query(
        r#"
            INSERT INTO indexer_cursor (id, last_block) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE
                SET last_block = excluded.last_block, updated_at = CURRENT_TIMESTAMP
                WHERE excluded.last_block >= indexer_cursor.last_block
        "#,
    )
    .bind(requested)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        let current = fetch_cursor(conn).await?.unwrap_or_default() as i64;
        return Err(LedgerError::CursorRegression { current, requested });
    }
    Ok(())
}
