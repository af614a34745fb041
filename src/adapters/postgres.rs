//! Postgres Backing Store
//!
//! Implements the `BackingStore` port on a `sqlx` connection pool.
//!
//! Full player rows and raw stat updates both land in `players`, the table
//! `load` reads; the other update kinds have one table each, keyed by `id`.
//! A write-behind batch becomes a single multi-row
//! `INSERT ... ON CONFLICT (id) DO UPDATE`. Raw kinds send `NULL` for the
//! fields a caller left out and the update keeps the stored value for those.
//! Read-only queries are wrapped so every row comes back as one JSON object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row as _};
use tracing::{debug, instrument};

use crate::cache::is_read_only;
use crate::domain::ports::{BackingStore, RowSet, SqlParam};
use crate::domain::PlayerRecord;
use crate::error::{Error, Result};
use crate::write_behind::{PendingUpdate, UpdateKind};

/// Tables used by [`PgBackingStore`].
pub const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS players (
    id           TEXT PRIMARY KEY,
    level        BIGINT,
    experience   BIGINT,
    energy       BIGINT,
    class        TEXT NOT NULL DEFAULT 'novice',
    last_active  TIMESTAMPTZ NOT NULL DEFAULT now(),
    damage_dealt BIGINT,
    credits      BIGINT,
    attributes   JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE TABLE IF NOT EXISTS player_inventory (
    id TEXT PRIMARY KEY, item_count BIGINT, rare_items BIGINT, equipped BIGINT
);
CREATE TABLE IF NOT EXISTS player_achievements (
    id TEXT PRIMARY KEY, unlocked BIGINT, points BIGINT
);
CREATE TABLE IF NOT EXISTS player_telemetry (
    id TEXT PRIMARY KEY, sessions BIGINT, commands BIGINT, play_seconds BIGINT
);";

/// Postgres SQLSTATE codes that mean the statement does not fit the schema.
const SCHEMA_ERROR_CODES: [&str; 4] = [
    "42P01", // undefined_table
    "42703", // undefined_column
    "42804", // datatype_mismatch
    "22003", // numeric_value_out_of_range
];

#[derive(sqlx::FromRow)]
struct PlayerRow {
    id: String,
    level: i64,
    experience: i64,
    energy: i64,
    class: String,
    last_active: DateTime<Utc>,
    damage_dealt: i64,
    credits: i64,
    attributes: Json<Map<String, Value>>,
}

impl From<PlayerRow> for PlayerRecord {
    fn from(row: PlayerRow) -> Self {
        PlayerRecord {
            id: row.id,
            level: u32::try_from(row.level).unwrap_or(1).max(1),
            experience: u64::try_from(row.experience).unwrap_or(0),
            energy: u32::try_from(row.energy).unwrap_or(0),
            class: row.class,
            last_active: row.last_active,
            damage_dealt: u64::try_from(row.damage_dealt).unwrap_or(0),
            credits: u64::try_from(row.credits).unwrap_or(0),
            attributes: row.attributes.0,
            partial: false,
        }
    }
}

/// Backing store on a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgBackingStore {
    pool: PgPool,
}

impl PgBackingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BackingStore for PgBackingStore {
    #[instrument(skip(self))]
    async fn load(&self, key: &str) -> Result<Option<PlayerRecord>> {
        let row = sqlx::query_as::<_, PlayerRow>(
            "SELECT id, COALESCE(level, 1) AS level, \
             COALESCE(experience, 0) AS experience, COALESCE(energy, 100) AS energy, \
             class, last_active, COALESCE(damage_dealt, 0) AS damage_dealt, \
             COALESCE(credits, 0) AS credits, attributes \
             FROM players WHERE id = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("players", e))?;

        Ok(row.map(PlayerRecord::from))
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn bulk_upsert(&self, kind: UpdateKind, rows: &[PendingUpdate]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut qb = build_upsert(kind, rows)?;
        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(kind.name(), e))?;

        debug!(affected = result.rows_affected(), "Bulk upsert complete");
        Ok(())
    }

    #[instrument(skip(self, params))]
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet> {
        let statement = sql.trim().trim_end_matches(';');

        if !is_read_only(statement) {
            bind_params(sqlx::query(statement), params)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("query", e))?;
            return Ok(RowSet::default());
        }

        let wrapped = format!("SELECT row_to_json(q) AS row FROM ({}) q", statement);
        let rows = bind_params(sqlx::query(&wrapped), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(value): Json<Value> = row
                .try_get("row")
                .map_err(|e| map_sqlx_error("query", e))?;
            match value {
                Value::Object(map) => out.push(map),
                other => {
                    return Err(Error::Internal(format!(
                        "row_to_json returned a non-object: {}",
                        other
                    )))
                }
            }
        }

        Ok(RowSet::new(out))
    }
}

/// One multi-row upsert for a batch of `kind`.
fn build_upsert(
    kind: UpdateKind,
    rows: &[PendingUpdate],
) -> Result<QueryBuilder<'static, Postgres>> {
    if let Some(row) = rows.iter().find(|row| row.kind() != kind) {
        return Err(Error::SchemaMismatch {
            kind: kind.to_string(),
            reason: format!("row for {} has kind {}", row.id(), row.kind()),
        });
    }

    let columns = kind.columns();
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} (id, {}) ",
        kind.table(),
        columns.join(", ")
    ));

    qb.push_values(rows.iter(), |mut values, row| {
        values.push_bind(row.id().to_string());
        match row {
            PendingUpdate::Player(record) => {
                values
                    .push_bind(i64::from(record.level))
                    .push_bind(bigint(record.experience))
                    .push_bind(i64::from(record.energy))
                    .push_bind(record.class.clone())
                    .push_bind(record.last_active)
                    .push_bind(bigint(record.damage_dealt))
                    .push_bind(bigint(record.credits))
                    .push_bind(Json(record.attributes.clone()));
            }
            raw => {
                for value in raw.values() {
                    values.push_bind(value);
                }
            }
        }
    });

    qb.push(" ON CONFLICT (id) DO UPDATE SET ");
    let table = kind.table();
    let mut assignments = qb.separated(", ");
    for column in columns {
        if kind.replaces_row() {
            assignments.push(format!("{column} = EXCLUDED.{column}"));
        } else {
            assignments.push(format!(
                "{column} = COALESCE(EXCLUDED.{column}, {table}.{column})"
            ));
        }
    }

    Ok(qb)
}

fn bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Translate a driver error; schema problems become `SchemaMismatch`.
fn map_sqlx_error(context: &str, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| SCHEMA_ERROR_CODES.iter().any(|c| code == *c)) =>
        {
            Error::SchemaMismatch {
                kind: context.to_string(),
                reason: db.message().to_string(),
            }
        }
        e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
            Error::BackingStoreUnavailable(e.to_string())
        }
        other => Error::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn stat(id: &str) -> PendingUpdate {
        PendingUpdate::normalize(UpdateKind::Stats, &json!(id), &Map::new()).unwrap()
    }

    #[test]
    fn test_stats_upsert_keeps_unset_columns() {
        let qb = build_upsert(UpdateKind::Stats, &[stat("u1"), stat("u2")]).unwrap();
        let sql = qb.sql();

        assert!(sql.starts_with(
            "INSERT INTO players (id, level, experience, energy, damage_dealt, credits) VALUES "
        ));
        assert!(sql.contains("($1, $2, $3, $4, $5, $6), ($7, $8, $9, $10, $11, $12)"));
        assert!(sql.contains(
            "ON CONFLICT (id) DO UPDATE SET level = COALESCE(EXCLUDED.level, players.level), "
        ));
        assert!(sql.ends_with("credits = COALESCE(EXCLUDED.credits, players.credits)"));
    }

    #[test]
    fn test_player_upsert_replaces_the_row() {
        let row = PendingUpdate::from_record(&PlayerRecord::new("u1", "mage")).unwrap();
        let qb = build_upsert(UpdateKind::Player, &[row]).unwrap();
        let sql = qb.sql();

        assert!(sql.starts_with(
            "INSERT INTO players (id, level, experience, energy, class, last_active, \
             damage_dealt, credits, attributes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ));
        assert!(sql.contains("class = EXCLUDED.class, "));
        assert!(sql.ends_with("attributes = EXCLUDED.attributes"));
    }

    #[test]
    fn test_upsert_rejects_mixed_kinds() {
        let telemetry =
            PendingUpdate::normalize(UpdateKind::Telemetry, &json!("u1"), &Map::new()).unwrap();
        assert_matches!(
            build_upsert(UpdateKind::Stats, &[stat("u1"), telemetry]),
            Err(Error::SchemaMismatch { .. })
        );
    }

    #[test]
    fn test_pool_errors_are_retryable() {
        let err = map_sqlx_error("stats", sqlx::Error::PoolTimedOut);
        assert_matches!(err, Error::BackingStoreUnavailable(_));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_conversion_clamps_negatives() {
        let record = PlayerRecord::from(PlayerRow {
            id: "u1".into(),
            level: 0,
            experience: -5,
            energy: 80,
            class: "mage".into(),
            last_active: Utc::now(),
            damage_dealt: 30,
            credits: 500,
            attributes: Json(Map::new()),
        });

        assert_eq!(record.level, 1);
        assert_eq!(record.experience, 0);
        assert!(!record.partial);
    }
}
