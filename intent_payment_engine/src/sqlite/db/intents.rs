use chrono::{DateTime, Utc};
use ipg_common::{ChainAddress, TokenAmount};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::IntentQueryFilter,
    db_types::{Intent, LifecycleStatus, NewIntent},
    traits::{InsertResult, LedgerError, Paged},
};

/// Inserts the intent row if it is not already present. Creation parameters are immutable, so a duplicate
/// observation of the same `IntentCreated` event is a no-op, not an error.
pub async fn idempotent_insert(intent: NewIntent, conn: &mut SqliteConnection) -> Result<InsertResult, LedgerError> {
    match sqlx::query(
        r#"
            INSERT INTO intents (
                address, payer, agent, token, total_cap, per_tx_cap, spent,
                start_time, end_time, metadata_uri, created_tx, created_block
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(intent.address.clone())
    .bind(intent.payer)
    .bind(intent.agent)
    .bind(intent.token)
    .bind(intent.total_cap)
    .bind(intent.per_tx_cap)
    .bind(intent.spent)
    .bind(intent.start_time)
    .bind(intent.end_time)
    .bind(intent.metadata_uri)
    .bind(intent.created_tx)
    .bind(intent.created_block)
    .execute(conn)
    .await
    {
        Ok(_) => {
            debug!("🗃️ Intent {} has been mirrored into the ledger", intent.address);
            Ok(InsertResult::Inserted)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertResult::AlreadyExists),
        Err(e) => Err(LedgerError::from(e)),
    }
}

pub async fn fetch_intent(
    address: &ChainAddress,
    conn: &mut SqliteConnection,
) -> Result<Option<Intent>, LedgerError> {
    let intent =
        sqlx::query_as("SELECT * FROM intents WHERE address = $1").bind(address).fetch_optional(conn).await?;
    Ok(intent)
}

/// Every intent address the ledger knows about, oldest first. The indexer scans each of these event streams on
/// every cycle, not just the ones created inside the current block range.
pub async fn all_addresses(conn: &mut SqliteConnection) -> Result<Vec<ChainAddress>, LedgerError> {
    let rows: Vec<(ChainAddress,)> =
        sqlx::query_as("SELECT address FROM intents ORDER BY created_block").fetch_all(conn).await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Writes the authoritative `spent` value read back from the contract. The schema refuses values above the cap, so
/// a bad read cannot break the `spent <= total_cap` invariant in the mirror.
pub async fn update_spent(
    address: &ChainAddress,
    spent: TokenAmount,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let res = sqlx::query("UPDATE intents SET spent = $1, updated_at = CURRENT_TIMESTAMP WHERE address = $2")
        .bind(spent)
        .bind(address)
        .execute(conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(LedgerError::IntentNotFound(address.clone()));
    }
    Ok(())
}

pub async fn mark_revoked(address: &ChainAddress, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let res = sqlx::query("UPDATE intents SET status = 'Revoked', updated_at = CURRENT_TIMESTAMP WHERE address = $1")
        .bind(address)
        .execute(conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(LedgerError::IntentNotFound(address.clone()));
    }
    Ok(())
}

/// Fetches intents according to the criteria in the `IntentQueryFilter`, newest first, along with the total match
/// count for pagination.
///
/// Status filters match the *derived* lifecycle: `Expired` selects non-revoked rows whose end time has passed, and
/// `Active`/`Paused` exclude rows that have lapsed. The comparison clock is passed in so that filtering and the
/// projector can never disagree.
pub async fn search_intents(
    filter: IntentQueryFilter,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Paged<Intent>, LedgerError> {
    let pagination = filter.pagination;

    let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM intents ");
    push_where_clause(&mut count_builder, &filter, now);
    let total: i64 = count_builder.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::new("SELECT * FROM intents ");
    push_where_clause(&mut builder, &filter, now);
    builder.push(" ORDER BY created_block DESC, address ");
    builder.push(" LIMIT ");
    builder.push_bind(pagination.limit);
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset);
    let intents: Vec<Intent> = builder.build_query_as().fetch_all(conn).await?;

    Ok(Paged::new(intents, total, pagination))
}

fn push_where_clause(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, filter: &IntentQueryFilter, now: DateTime<Utc>) {
    if filter.is_unfiltered() {
        return;
    }
    builder.push("WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(payer) = &filter.payer {
        where_clause.push("payer = ");
        where_clause.push_bind_unseparated(payer.clone());
    }
    if let Some(agent) = &filter.agent {
        where_clause.push("agent = ");
        where_clause.push_bind_unseparated(agent.clone());
    }
    if let Some(token) = &filter.token {
        where_clause.push("token = ");
        where_clause.push_bind_unseparated(token.clone());
    }
    if let Some(after) = filter.created_after_block {
        where_clause.push("created_block >= ");
        where_clause.push_bind_unseparated(after);
    }
    if let Some(before) = filter.created_before_block {
        where_clause.push("created_block <= ");
        where_clause.push_bind_unseparated(before);
    }
    if let Some(statuses) = filter.status.as_ref().filter(|s| !s.is_empty()) {
        where_clause.push("(");
        let mut first = true;
        for status in statuses {
            if !first {
                where_clause.push_unseparated(" OR ");
            }
            first = false;
            match status {
                LifecycleStatus::Active => {
                    where_clause.push_unseparated("(status = 'Active' AND end_time > ");
                    where_clause.push_bind_unseparated(now);
                    where_clause.push_unseparated(")");
                },
                LifecycleStatus::Paused => {
                    where_clause.push_unseparated("(status = 'Paused' AND end_time > ");
                    where_clause.push_bind_unseparated(now);
                    where_clause.push_unseparated(")");
                },
                LifecycleStatus::Revoked => {
                    where_clause.push_unseparated("(status = 'Revoked')");
                },
                LifecycleStatus::Expired => {
                    where_clause.push_unseparated("(status != 'Revoked' AND end_time <= ");
                    where_clause.push_bind_unseparated(now);
                    where_clause.push_unseparated(")");
                },
            }
        }
        where_clause.push_unseparated(")");
    }
}
