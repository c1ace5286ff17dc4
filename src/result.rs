//! Execution results and row materialization.
//!
//! Column values are scanned as raw bytes and kept unchanged; no type
//! information is requested from the driver. The typed view is produced
//! afterwards by running the record marshaler in reverse.

use crate::error::{Error, Result};
use crate::record::{from_field_map, FieldMap, Record};
use crate::scalar::FieldValue;

/// Forward-only cursor over the rows of a query, owned by a single consumer.
pub trait RowCursor: Send {
    /// Column names in result order.
    fn columns(&mut self) -> Result<Vec<String>>;

    /// Advances to the next row; `false` once exhausted.
    fn next_row(&mut self) -> Result<bool>;

    /// Fills one slot per column for the current row. SQL NULL leaves `None`.
    fn scan_raw(&mut self, slots: &mut [Option<Vec<u8>>]) -> Result<()>;

    /// Releases driver resources. Must be safe to call more than once.
    fn close(&mut self);
}

struct CloseOnDrop(Box<dyn RowCursor>);

impl CloseOnDrop {
    fn drain(mut self) -> Result<Vec<FieldMap>> {
        let cursor = &mut self.0;
        let columns = cursor.columns()?;
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; columns.len()];
        let mut rows = Vec::new();

        while cursor.next_row()? {
            slots.iter_mut().for_each(|slot| *slot = None);
            cursor.scan_raw(&mut slots)?;

            let mut row = FieldMap::with_capacity(columns.len());
            for (column, slot) in columns.iter().zip(slots.iter_mut()) {
                if let Some(bytes) = slot.take() {
                    row.insert(column.as_str(), FieldValue::from_raw(bytes));
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Reads every remaining row of `cursor` into field maps.
///
/// The cursor is closed before returning, whether materialization succeeds
/// or not. NULL columns are left out of the row's map; other values keep
/// their scanned bytes.
pub fn materialize_rows(cursor: Box<dyn RowCursor>) -> Result<Vec<FieldMap>> {
    CloseOnDrop(cursor).drain()
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub affected_rows: u64,
    pub last_insert_id: i64,
    /// Non-fatal driver warnings.
    pub warnings: Vec<String>,
}

/// An open query, ready to be materialized once.
///
/// The cursor is closed when the result is materialized or dropped.
pub struct QueryResult {
    cursor: CloseOnDrop,
    /// Non-fatal driver warnings.
    pub warnings: Vec<String>,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

impl QueryResult {
    pub fn new(cursor: Box<dyn RowCursor>) -> Self {
        Self {
            cursor: CloseOnDrop(cursor),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// All rows as field maps.
    pub fn to_maps(self) -> Result<Vec<FieldMap>> {
        self.cursor.drain()
    }

    /// The first row, or [`Error::EmptyResult`].
    pub fn first_map(self) -> Result<FieldMap> {
        self.to_maps()?.into_iter().next().ok_or(Error::EmptyResult)
    }

    /// Populates `record` from the first row.
    pub fn first_to_record<R: Record>(self, record: &mut R) -> Result<()> {
        let row = self.first_map()?;
        from_field_map(&row, record)
    }

    /// Appends one record per row to `out`, in cursor order.
    ///
    /// Nothing is appended if any row fails to convert.
    pub fn to_records<R: Record + Default>(self, out: &mut Vec<R>) -> Result<()> {
        let rows = self.to_maps()?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = R::default();
            from_field_map(row, &mut record)?;
            records.push(record);
        }
        out.extend(records);
        Ok(())
    }

    /// Collects one record per row.
    pub fn records<R: Record + Default>(self) -> Result<Vec<R>> {
        let mut out = Vec::new();
        self.to_records(&mut out)?;
        Ok(out)
    }
}

/// A cursor over rows already held in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    columns: Vec<String>,
    rows: std::collections::VecDeque<Vec<Option<Vec<u8>>>>,
    current: Option<Vec<Option<Vec<u8>>>>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            current: None,
            closed: false,
        }
    }
}

impl RowCursor for BufferedCursor {
    fn columns(&mut self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn next_row(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn scan_raw(&mut self, slots: &mut [Option<Vec<u8>>]) -> Result<()> {
        let row = self
            .current
            .take()
            .ok_or_else(|| Error::sql("scan called without a current row"))?;
        if row.len() != slots.len() {
            return Err(Error::sql(format!(
                "expected {} columns, row has {}",
                slots.len(),
                row.len()
            )));
        }
        for (slot, value) in slots.iter_mut().zip(row) {
            *slot = value;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn raw(values: &[Option<&str>]) -> Vec<Option<Vec<u8>>> {
        values.iter().map(|v| v.map(|s| s.as_bytes().to_vec())).collect()
    }

    /// Counts `close` calls and can fail at a chosen step.
    struct ScriptedCursor {
        inner: BufferedCursor,
        closes: Arc<AtomicUsize>,
        fail_columns: bool,
        fail_scan_at: Option<usize>,
        scanned: usize,
    }

    impl ScriptedCursor {
        fn new(rows: Vec<Vec<Option<Vec<u8>>>>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let cursor = Self {
                inner: BufferedCursor::new(vec!["id".into(), "name".into()], rows),
                closes: closes.clone(),
                fail_columns: false,
                fail_scan_at: None,
                scanned: 0,
            };
            (cursor, closes)
        }
    }

    impl RowCursor for ScriptedCursor {
        fn columns(&mut self) -> Result<Vec<String>> {
            if self.fail_columns {
                return Err(Error::sql("columns unavailable"));
            }
            self.inner.columns()
        }

        fn next_row(&mut self) -> Result<bool> {
            self.inner.next_row()
        }

        fn scan_raw(&mut self, slots: &mut [Option<Vec<u8>>]) -> Result<()> {
            if self.fail_scan_at == Some(self.scanned) {
                return Err(Error::sql("scan failed"));
            }
            self.scanned += 1;
            self.inner.scan_raw(slots)
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close();
        }
    }

    fn two_rows() -> Vec<Vec<Option<Vec<u8>>>> {
        vec![raw(&[Some("1"), Some("ann")]), raw(&[Some("2"), None])]
    }

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: u32,
        name: String,
    }

    crate::record!(Person {
        id => "id",
        name => "name",
    });

    #[test]
    fn rows_become_text_maps_and_cursor_closes_once() {
        let (cursor, closes) = ScriptedCursor::new(two_rows());
        let rows = materialize_rows(Box::new(cursor)).unwrap();
        assert_eq!(
            rows,
            vec![
                FieldMap::new().with("id", "1").with("name", "ann"),
                FieldMap::new().with("id", "2"),
            ]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scan_error_still_closes_cursor() {
        let (mut cursor, closes) = ScriptedCursor::new(two_rows());
        cursor.fail_scan_at = Some(1);
        let err = materialize_rows(Box::new(cursor)).unwrap_err();
        assert_eq!(err.to_string(), "sql error: scan failed");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn column_error_still_closes_cursor() {
        let (mut cursor, closes) = ScriptedCursor::new(two_rows());
        cursor.fail_columns = true;
        assert!(materialize_rows(Box::new(cursor)).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn binary_columns_keep_their_bytes() {
        let png = vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff];
        let (cursor, closes) = ScriptedCursor::new(vec![vec![Some(png.clone()), None]]);
        let rows = materialize_rows(Box::new(cursor)).unwrap();
        assert_eq!(rows, vec![FieldMap::new().with("id", png)]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_an_unread_result_closes_the_cursor() {
        let (cursor, closes) = ScriptedCursor::new(two_rows());
        let result = QueryResult::new(Box::new(cursor)).with_warnings(vec!["w".into()]);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        drop(result);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn early_return_before_reading_closes_the_cursor() {
        fn bail(result: QueryResult) -> Result<Vec<FieldMap>> {
            if !result.warnings.is_empty() {
                return Err(Error::sql("warned"));
            }
            result.to_maps()
        }

        let (cursor, closes) = ScriptedCursor::new(two_rows());
        let result = QueryResult::new(Box::new(cursor)).with_warnings(vec!["w".into()]);
        assert!(bail(result).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_map_of_empty_result() {
        let (cursor, closes) = ScriptedCursor::new(vec![]);
        let err = QueryResult::new(Box::new(cursor)).first_map().unwrap_err();
        assert!(matches!(err, Error::EmptyResult));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_to_record_uses_first_row() {
        let (cursor, _) = ScriptedCursor::new(two_rows());
        let mut person = Person::default();
        QueryResult::new(Box::new(cursor))
            .first_to_record(&mut person)
            .unwrap();
        assert_eq!(
            person,
            Person {
                id: 1,
                name: "ann".into()
            }
        );
    }

    #[test]
    fn to_records_appends_in_cursor_order() {
        let (cursor, _) = ScriptedCursor::new(two_rows());
        let mut people = vec![Person {
            id: 0,
            name: "existing".into(),
        }];
        QueryResult::new(Box::new(cursor))
            .to_records(&mut people)
            .unwrap();
        assert_eq!(people.len(), 3);
        assert_eq!(people[1].id, 1);
        assert_eq!(people[2].id, 2);
        assert_eq!(people[2].name, "");
    }

    #[test]
    fn to_records_is_all_or_nothing() {
        let rows = vec![raw(&[Some("1"), Some("a")]), raw(&[Some("x"), Some("b")])];
        let (cursor, _) = ScriptedCursor::new(rows);
        let mut people: Vec<Person> = Vec::new();
        let err = QueryResult::new(Box::new(cursor))
            .to_records(&mut people)
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        assert!(people.is_empty());
    }

    #[test]
    fn buffered_cursor_close_is_idempotent() {
        let mut cursor = BufferedCursor::new(vec!["a".into()], vec![raw(&[Some("1")])]);
        cursor.close();
        cursor.close();
        assert!(!cursor.next_row().unwrap());
    }
}
