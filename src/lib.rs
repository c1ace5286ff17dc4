//! Lightweight record <-> SQL mapping for the Runar ecosystem.
//!
//! # Intention
//!
//! - Map plain records (typed structs or loose `column -> text` maps) to
//!   parameterized SQL statements and query rows back to records.
//! - Turn loosely-typed condition maps into parameterized WHERE clauses.
//! - Keep every builder pure; the only I/O goes through an [`Executor`].
//!
//! # Architectural Boundaries
//!
//! - No query planning, joins, schema migration or caching.
//! - Connection handling, pooling and transactions belong to the executor;
//!   [`sqlite::SqliteExecutor`] is the bundled rusqlite implementation.
//! - The core never logs; executors do.

pub mod client;
pub mod error;
pub mod predicate;
pub mod record;
pub mod result;
pub mod scalar;
pub mod sqlite;
pub mod statement;

pub use client::{Client, Executor};
pub use error::{ConversionError, Error, Result};
pub use predicate::{
    build_predicate, build_predicate_with, Conditions, Predicate, PredicateMode, WhereOperator,
};
pub use record::{from_field_map, to_field_map, to_field_map_list, FieldMap, Record, RecordRef};
pub use result::{materialize_rows, BufferedCursor, ExecResult, QueryResult, RowCursor};
pub use scalar::{Column, FieldValue, Marshal, Scalar, ScalarKind, Value};
pub use sqlite::{SqliteConfig, SqliteExecutor};
pub use statement::{Dialect, Statement, StatementBuilder};
