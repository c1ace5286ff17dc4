use async_trait::async_trait;
use futures::lock::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::{Client, Executor};
use crate::error::{Error, Result};
use crate::result::{BufferedCursor, ExecResult, QueryResult};
use crate::scalar::Value;
use crate::statement::Dialect;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

fn default_pragmas() -> BTreeMap<String, String> {
    [
        ("foreign_keys", "ON"),
        ("synchronous", "NORMAL"),
        ("temp_store", "MEMORY"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// SQLite executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Pragmas applied right after the connection opens
    #[serde(default = "default_pragmas")]
    pub pragmas: BTreeMap<String, String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Log every statement at debug level
    #[serde(default)]
    pub debug: bool,
}

impl SqliteConfig {
    /// Create a new SQLite config with path and default pragmas
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            pragmas: default_pragmas(),
            busy_timeout_ms: default_busy_timeout_ms(),
            debug: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Set a pragma, replacing any previous value
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pragmas.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.pragmas.remove(key);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The pragma batch run on open.
    pub fn pragma_sql(&self) -> String {
        self.pragmas
            .iter()
            .map(|(k, v)| format!("PRAGMA {k} = {v};"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

fn raw_bytes(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string().into_bytes()),
        ValueRef::Real(v) => Some(v.to_string().into_bytes()),
        ValueRef::Text(v) | ValueRef::Blob(v) => Some(v.to_vec()),
    }
}

/// [`Executor`] over a single rusqlite connection.
///
/// Query results are read fully while the connection is locked and handed
/// out as a [`BufferedCursor`].
///
/// Column affinity still applies to bound values. A `u64` above `i64::MAX`
/// binds as text; in an INTEGER or NUMERIC column SQLite stores it as a
/// REAL and it no longer reads back as a `u64`. Keep such fields in TEXT
/// columns.
pub struct SqliteExecutor {
    config: SqliteConfig,
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteExecutor {
    /// Open the database and apply the configured pragmas
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let connection = if config.db_path == MEMORY_PATH {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        connection.execute_batch(&config.pragma_sql())?;
        tracing::debug!(path = %config.db_path, "opened sqlite database");
        Ok(Self {
            config,
            connection: Mutex::new(connection),
        })
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run several `;`-separated statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.connection.lock().await;
        if self.config.debug {
            tracing::debug!(sql, "execute batch");
        }
        conn.execute_batch(sql).map_err(|err| {
            tracing::warn!(error = %err, sql, "execute batch failed");
            Error::from(err)
        })
    }

    pub async fn begin(&self) -> Result<()> {
        self.execute_batch("BEGIN").await
    }

    pub async fn commit(&self) -> Result<()> {
        self.execute_batch("COMMIT").await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.execute_batch("ROLLBACK").await
    }

    /// Close the underlying connection
    pub fn close(self) -> Result<()> {
        self.connection
            .into_inner()
            .close()
            .map_err(|(_, err)| Error::from(err))
    }

    fn read_all(
        conn: &Connection,
        sql: &str,
        params: &[Value],
    ) -> rusqlite::Result<BufferedCursor> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next()? {
            let mut raw = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                raw.push(raw_bytes(row.get_ref(index)?));
            }
            buffered.push(raw);
        }
        Ok(BufferedCursor::new(columns, buffered))
    }
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let conn = self.connection.lock().await;
        if self.config.debug {
            tracing::debug!(sql, ?params, "execute");
        }
        match conn.execute(sql, params_from_iter(params.iter())) {
            Ok(affected) => Ok(ExecResult {
                affected_rows: affected as u64,
                last_insert_id: conn.last_insert_rowid(),
                warnings: Vec::new(),
            }),
            Err(err) => {
                tracing::warn!(error = %err, sql, "execute failed");
                Err(err.into())
            }
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.connection.lock().await;
        if self.config.debug {
            tracing::debug!(sql, ?params, "query");
        }
        match Self::read_all(&conn, sql, params) {
            Ok(cursor) => Ok(QueryResult::new(Box::new(cursor))),
            Err(err) => {
                tracing::warn!(error = %err, sql, "query failed");
                Err(err.into())
            }
        }
    }
}

impl Client<SqliteExecutor> {
    /// Open a SQLite-backed client using the SQLite upsert dialect
    pub fn open_sqlite(config: SqliteConfig) -> Result<Self> {
        Ok(Client::new(SqliteExecutor::open(config)?).with_dialect(Dialect::Sqlite))
    }
}
