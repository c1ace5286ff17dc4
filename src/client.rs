//! The executor boundary and the client facade over it.
//!
//! [`Executor`] is the only seam to a real database: it runs one statement
//! per call. [`Client`] marshals records, builds the statement and hands it
//! to the executor. It never starts or commits transactions and never
//! retries.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::predicate::{build_predicate_with, Conditions, PredicateMode};
use crate::record::{to_field_map, to_field_map_list, RecordRef};
use crate::result::{ExecResult, QueryResult};
use crate::scalar::Value;
use crate::statement::{Dialect, Statement, StatementBuilder};

/// Runs SQL statements against a database.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        (**self).execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        (**self).query(sql, params).await
    }
}

/// Record-level operations over an [`Executor`].
#[derive(Debug, Clone)]
pub struct Client<E> {
    executor: E,
    dialect: Dialect,
    predicate_mode: PredicateMode,
}

impl<E: Executor> Client<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            dialect: Dialect::default(),
            predicate_mode: PredicateMode::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_predicate_mode(mut self, mode: PredicateMode) -> Self {
        self.predicate_mode = mode;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn builder<'t>(&self, table: &'t str) -> StatementBuilder<'t> {
        StatementBuilder::new(table).with_dialect(self.dialect)
    }

    /// Runs a prepared statement.
    pub async fn exec(&self, statement: Statement) -> Result<ExecResult> {
        self.executor
            .execute(&statement.sql, &statement.params)
            .await
            .map_err(Error::normalized)
    }

    /// Runs a prepared query.
    pub async fn query(&self, statement: Statement) -> Result<QueryResult> {
        self.executor
            .query(&statement.sql, &statement.params)
            .await
            .map_err(Error::normalized)
    }

    /// Runs raw SQL with positional parameters.
    pub async fn exec_sql(&self, sql: &str, params: Vec<Value>) -> Result<ExecResult> {
        self.exec(Statement::new(sql, params)).await
    }

    /// Runs a raw SQL query with positional parameters.
    pub async fn query_sql(&self, sql: &str, params: Vec<Value>) -> Result<QueryResult> {
        self.query(Statement::new(sql, params)).await
    }

    pub async fn insert<'a>(
        &self,
        table: &str,
        record: impl Into<RecordRef<'a>>,
    ) -> Result<ExecResult> {
        let fields = to_field_map(record)?;
        self.exec(self.builder(table).insert(&fields)?).await
    }

    /// Updates every marshaled column of `record` on rows matching `where_fmt`.
    pub async fn update<'a>(
        &self,
        table: &str,
        record: impl Into<RecordRef<'a>>,
        where_fmt: &str,
        where_params: Vec<Value>,
    ) -> Result<ExecResult> {
        let fields = to_field_map(record)?;
        let statement = self.builder(table).update(&fields, where_fmt, where_params)?;
        self.exec(statement).await
    }

    /// Updates only `columns` of `record`, so a full record can be used
    /// without overwriting unrelated columns.
    pub async fn update_fields<'a, S: AsRef<str> + Sync>(
        &self,
        table: &str,
        record: impl Into<RecordRef<'a>>,
        columns: &[S],
        where_fmt: &str,
        where_params: Vec<Value>,
    ) -> Result<ExecResult> {
        let fields = to_field_map(record)?;
        let statement = self
            .builder(table)
            .update_fields(&fields, columns, where_fmt, where_params)?;
        self.exec(statement).await
    }

    pub async fn delete(
        &self,
        table: &str,
        where_fmt: &str,
        where_params: Vec<Value>,
    ) -> Result<ExecResult> {
        self.exec(self.builder(table).delete(where_fmt, where_params))
            .await
    }

    /// Inserts `record`, or re-assigns all its columns on key conflict.
    pub async fn insert_or_update<'a>(
        &self,
        table: &str,
        record: impl Into<RecordRef<'a>>,
    ) -> Result<ExecResult> {
        let fields = to_field_map(record)?;
        self.exec(self.builder(table).upsert(&fields)?).await
    }

    /// Inserts `record`, or re-assigns only `columns` on key conflict.
    pub async fn insert_or_update_fields<'a, S: AsRef<str> + Sync>(
        &self,
        table: &str,
        record: impl Into<RecordRef<'a>>,
        columns: &[S],
    ) -> Result<ExecResult> {
        let fields = to_field_map(record)?;
        self.exec(self.builder(table).upsert_fields(&fields, columns)?)
            .await
    }

    pub async fn batch_insert<'a, T: 'a>(
        &self,
        table: &str,
        records: &'a [T],
    ) -> Result<ExecResult>
    where
        &'a T: Into<RecordRef<'a>>,
    {
        let rows = to_field_map_list(records)?;
        self.exec(self.builder(table).batch_insert(&rows)?).await
    }

    pub async fn batch_replace<'a, T: 'a>(
        &self,
        table: &str,
        records: &'a [T],
    ) -> Result<ExecResult>
    where
        &'a T: Into<RecordRef<'a>>,
    {
        let rows = to_field_map_list(records)?;
        self.exec(self.builder(table).batch_replace(&rows)?).await
    }

    /// `SELECT columns FROM table` filtered by a condition map.
    pub async fn select_where<S: AsRef<str> + Sync>(
        &self,
        table: &str,
        columns: &[S],
        conditions: &Conditions,
    ) -> Result<QueryResult> {
        let predicate = build_predicate_with(conditions, self.predicate_mode)?;
        self.query(self.builder(table).select(columns, predicate))
            .await
    }
}
