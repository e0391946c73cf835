//! SQLite implementation of DataStore
//!
//! Each store serves one entity. Records live in the shared `records`
//! table, keyed by `(entity, id)`, with the field map serialized as JSON.
//!
//! ## Query Mapping
//!
//! | Fetch option          | SQL                                               |
//! |-----------------------|---------------------------------------------------|
//! | `Condition` eq/ne     | `json_extract(body, ?) = ?` / `COALESCE(.. <> ?, 1)` |
//! | `Condition` lt/le/gt/ge | `json_extract(body, ?) < ?` and friends         |
//! | `Condition` contains  | array membership via `json_each`, else `instr`    |
//! | `Condition` prefix    | `instr(json_extract(body, ?), ?) = 1`             |
//! | `Filter::Raw`         | appended verbatim as `AND (<expr>)`               |
//! | sort / order attribute| `ORDER BY json_extract(body, ?) ASC|DESC, seq`    |
//! | page size             | `LIMIT page_size + 1 OFFSET ?` (one-row look-ahead) |
//!
//! Field paths and values are always bound parameters. Raw filters are
//! trusted SQL and may reference the `id` and `body` columns.

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::debug;

use itemstore_core::domain::{
    BatchCursor, Condition, ConditionOp, FetchOptions, Filter, PagingScheme, Record, RecordId,
    SortDescriptor, StoreError,
};
use itemstore_core::ports::{validate_fetch, DataStore, FetchedBatch};

/// Shape of one entity stored in the `records` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDefinition {
    pub name: String,
    /// Fields that must be present and non-null on insert and update
    pub required_fields: Vec<String>,
    /// Default ordering when fetch options carry none
    pub order_attribute: Option<String>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_fields: Vec::new(),
            order_attribute: None,
        }
    }

    pub fn with_required_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn with_order_attribute(mut self, field: impl Into<String>) -> Self {
        self.order_attribute = Some(field.into());
        self
    }
}

/// SQLite-backed store for one entity
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    entity: EntityDefinition,
}

impl SqliteStore {
    /// Creates a store for `entity` over an already-migrated pool
    pub fn new(pool: SqlitePool, entity: EntityDefinition) -> Self {
        Self { pool, entity }
    }

    pub fn entity(&self) -> &EntityDefinition {
        &self.entity
    }

    /// Number of stored records of this entity
    pub async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM records WHERE entity = ?")
            .bind(self.entity.name.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx_error)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn check_required(&self, record: &Record) -> Result<(), StoreError> {
        let missing: Vec<&str> = self
            .entity
            .required_fields
            .iter()
            .filter(|f| matches!(record.get(f), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(StoreError::ValidationRejected(format!(
            "{} is missing required fields: {}",
            self.entity.name,
            missing.join(", ")
        )))
    }

    fn sort_for(&self, options: &FetchOptions) -> Vec<SortDescriptor> {
        let mut sort = options.effective_sort();
        if let Some(attr) = &self.entity.order_attribute {
            if !sort.iter().any(|d| &d.field == attr) {
                sort.push(SortDescriptor::ascending(attr.clone()));
            }
        }
        sort
    }

    fn select_sql(
        &self,
        options: &FetchOptions,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<(String, Vec<SqlParam>), StoreError> {
        let mut sql = String::from("SELECT id, body FROM records WHERE entity = ?");
        let mut params = vec![SqlParam::Text(self.entity.name.clone())];

        match &options.filter {
            Some(Filter::Raw(expr)) => {
                sql.push_str(" AND (");
                sql.push_str(expr);
                sql.push(')');
            }
            Some(Filter::Conditions(conditions)) => {
                for condition in conditions {
                    sql.push_str(" AND ");
                    sql.push_str(&condition_sql(condition, &mut params)?);
                }
            }
            None => {}
        }

        sql.push_str(" ORDER BY ");
        for descriptor in self.sort_for(options) {
            params.push(SqlParam::Text(json_path(&descriptor.field)?));
            sql.push_str("json_extract(body, ?) ");
            sql.push_str(if descriptor.ascending { "ASC, " } else { "DESC, " });
        }
        sql.push_str("seq ASC LIMIT ? OFFSET ?");

        // One extra row tells whether another batch exists
        let limit = limit.map_or(-1, |l| i64::try_from(l.saturating_add(1)).unwrap_or(i64::MAX));
        params.push(SqlParam::Integer(limit));
        params.push(SqlParam::Integer(
            i64::try_from(offset).unwrap_or(i64::MAX),
        ));
        Ok((sql, params))
    }
}

// ============================================================================
// SQL building helpers
// ============================================================================

enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

fn json_param(value: &Value) -> SqlParam {
    match value {
        Value::Null => SqlParam::Null,
        Value::Bool(b) => SqlParam::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlParam::Integer(i),
            None => SqlParam::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlParam::Text(s.clone()),
        other => SqlParam::Text(other.to_string()),
    }
}

/// `$.field` path for a field name made of letters, digits, `_`, `-` and
/// `.` (nested keys)
fn json_path(field: &str) -> Result<String, StoreError> {
    let valid = !field.is_empty()
        && !field.starts_with('.')
        && !field.ends_with('.')
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(StoreError::InvalidConfiguration(format!(
            "unsupported field name for SQL filters: '{field}'"
        )));
    }
    Ok(format!("$.{field}"))
}

fn condition_sql(condition: &Condition, params: &mut Vec<SqlParam>) -> Result<String, StoreError> {
    let path = json_path(&condition.field)?;
    let value = &condition.value;
    let column = "json_extract(body, ?)";

    let clause = match (condition.op, value) {
        (ConditionOp::Eq, Value::Null) => {
            params.push(SqlParam::Text(path));
            format!("{column} IS NULL")
        }
        (ConditionOp::Ne, Value::Null) => {
            params.push(SqlParam::Text(path));
            format!("{column} IS NOT NULL")
        }
        (ConditionOp::Eq, _) => {
            params.extend([SqlParam::Text(path), json_param(value)]);
            format!("{column} = ?")
        }
        // Missing fields differ from any value
        (ConditionOp::Ne, _) => {
            params.extend([SqlParam::Text(path), json_param(value)]);
            format!("COALESCE({column} <> ?, 1)")
        }
        (ConditionOp::Lt | ConditionOp::Le | ConditionOp::Gt | ConditionOp::Ge, _) => {
            let op = match condition.op {
                ConditionOp::Lt => "<",
                ConditionOp::Le => "<=",
                ConditionOp::Gt => ">",
                _ => ">=",
            };
            params.extend([SqlParam::Text(path), json_param(value)]);
            format!("{column} {op} ?")
        }
        (ConditionOp::Contains, _) => {
            params.extend([
                SqlParam::Text(path.clone()),
                SqlParam::Text(path.clone()),
                json_param(value),
                SqlParam::Text(path),
                json_param(value),
            ]);
            "(CASE json_type(body, ?) \
               WHEN 'array' THEN EXISTS (SELECT 1 FROM json_each(body, ?) WHERE json_each.value = ?) \
               ELSE COALESCE(instr(json_extract(body, ?), ?) > 0, 0) END)"
                .to_string()
        }
        (ConditionOp::Prefix, _) => {
            params.extend([SqlParam::Text(path), json_param(value)]);
            format!("COALESCE(instr({column}, ?) = 1, 0)")
        }
    };
    Ok(clause)
}

fn bind_all(
    sql: &str,
    params: Vec<SqlParam>,
) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s),
            SqlParam::Integer(i) => query.bind(i),
            SqlParam::Real(f) => query.bind(f),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

fn record_from_row(row: &SqliteRow) -> Result<Record, StoreError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let body: String = row.try_get("body").map_err(map_sqlx_error)?;
    let fields = match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            return Err(StoreError::Unexpected(format!(
                "record {id} body is not a JSON object"
            )))
        }
        Err(e) => {
            return Err(StoreError::Unexpected(format!(
                "record {id} body is not valid JSON: {e}"
            )))
        }
    };
    let id = RecordId::new(id).map_err(|e| StoreError::Unexpected(e.to_string()))?;
    Ok(Record::from_fields(fields).with_id(id))
}

fn encode_body(record: &Record) -> Result<String, StoreError> {
    serde_json::to_string(record.fields())
        .map_err(|e| StoreError::Unexpected(format!("Failed to encode record body: {e}")))
}

/// Classify SQLx errors into the store error taxonomy
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::ConnectionUnavailable(err.to_string())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_check_violation()
                || db.is_foreign_key_violation() =>
        {
            StoreError::ValidationRejected(db.message().to_string())
        }
        // SQLITE_BUSY / SQLITE_LOCKED once the busy timeout has elapsed
        sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("5" | "6")) => {
            StoreError::ConnectionUnavailable(db.message().to_string())
        }
        _ => StoreError::Unexpected(err.to_string()),
    }
}

// ============================================================================
// DataStore implementation
// ============================================================================

#[async_trait::async_trait]
impl DataStore for SqliteStore {
    fn paging_scheme(&self) -> PagingScheme {
        PagingScheme::Offset
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
    ) -> Result<FetchedBatch, StoreError> {
        validate_fetch(options, cursor, PagingScheme::Offset)?;
        if !cursor.has_more() {
            return Ok(FetchedBatch::exhausted());
        }
        let offset = cursor.resolve_offset(options)?;
        let limit = options.page_size.limit();
        let (sql, params) = self.select_sql(options, offset, limit)?;

        let rows = bind_all(&sql, params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let mut records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = match limit {
            Some(limit) if records.len() > limit => {
                records.truncate(limit);
                true
            }
            _ => false,
        };
        let next_offset = offset + records.len();

        debug!(
            entity = %self.entity.name,
            offset,
            returned = records.len(),
            has_more,
            "Fetched SQLite batch"
        );
        Ok(FetchedBatch::new(
            records,
            BatchCursor::offset(next_offset, has_more),
        ))
    }

    async fn insert(&self, record: &Record) -> Result<Record, StoreError> {
        self.check_required(record)?;
        let id = record.id().cloned().unwrap_or_else(RecordId::generate);
        let body = encode_body(record)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let inserted = sqlx::query(
            "INSERT INTO records (entity, id, body, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(self.entity.name.as_str())
        .bind(id.as_str())
        .bind(body.as_str())
        .bind(now.as_str())
        .bind(now.as_str())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(match map_sqlx_error(e) {
                StoreError::ValidationRejected(_) => StoreError::ValidationRejected(format!(
                    "{} {id} already exists",
                    self.entity.name
                )),
                other => other,
            });
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(entity = %self.entity.name, id = %id, "Inserted record");
        Ok(record.clone().with_id(id))
    }

    async fn update(&self, record: &Record) -> Result<Record, StoreError> {
        let id = record
            .id()
            .ok_or_else(|| StoreError::ValidationRejected("record has no identifier".into()))?;
        self.check_required(record)?;
        let body = encode_body(record)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let result = sqlx::query(
            "UPDATE records SET body = ?, updated_at = ? WHERE entity = ? AND id = ?",
        )
        .bind(body.as_str())
        .bind(now.as_str())
        .bind(self.entity.name.as_str())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(StoreError::NotFound(format!("{} {id}", self.entity.name)));
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(entity = %self.entity.name, id = %id, "Updated record");
        Ok(record.clone())
    }

    async fn delete(&self, record: &Record) -> Result<(), StoreError> {
        let id = record
            .id()
            .ok_or_else(|| StoreError::ValidationRejected("record has no identifier".into()))?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let result = sqlx::query("DELETE FROM records WHERE entity = ? AND id = ?")
            .bind(self.entity.name.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(StoreError::NotFound(format!("{} {id}", self.entity.name)));
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(entity = %self.entity.name, id = %id, "Deleted record");
        Ok(())
    }
}
