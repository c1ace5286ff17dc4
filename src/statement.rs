//! Parameterized statement assembly from field maps.
//!
//! Builders are pure: they only produce SQL text and the matching ordered
//! parameter list. `where_fmt` fragments are raw SQL supplied by the caller
//! and are not escaped; only bound values are safe against injection.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::FieldMap;
use crate::scalar::Value;

/// SQL text with `?` placeholders and its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Target SQL dialect; only the upsert clause differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `ON DUPLICATE KEY UPDATE`
    #[default]
    MySql,
    /// `ON CONFLICT DO UPDATE SET`
    Sqlite,
}

impl Dialect {
    fn upsert_clause(self) -> &'static str {
        match self {
            Dialect::MySql => "ON DUPLICATE KEY UPDATE",
            Dialect::Sqlite => "ON CONFLICT DO UPDATE SET",
        }
    }
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn field_params(fields: &FieldMap) -> impl Iterator<Item = Value> + '_ {
    fields.iter().map(|(_, v)| v.to_param())
}

fn column_list(fields: &FieldMap) -> String {
    fields
        .columns()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(",")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn assignments(fields: &FieldMap) -> String {
    fields
        .columns()
        .map(|c| format!("{}=?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds statements against a single table.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder<'a> {
    table: &'a str,
    dialect: Dialect,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a str) -> Self {
        Self {
            table,
            dialect: Dialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn table(&self) -> String {
        quote_ident(self.table)
    }

    /// `INSERT INTO t (..) VALUES (..)`
    pub fn insert(&self, fields: &FieldMap) -> Result<Statement> {
        if fields.is_empty() {
            return Err(Error::sql("nothing insert"));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            column_list(fields),
            placeholders(fields.len())
        );
        Ok(Statement::new(sql, field_params(fields).collect()))
    }

    /// `UPDATE t SET .. WHERE <where_fmt>`; field values bind before `where_params`.
    pub fn update(
        &self,
        fields: &FieldMap,
        where_fmt: &str,
        where_params: Vec<Value>,
    ) -> Result<Statement> {
        if fields.is_empty() {
            return Err(Error::sql("nothing update"));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table(),
            assignments(fields),
            where_fmt
        );
        let mut params: Vec<Value> = field_params(fields).collect();
        params.extend(where_params);
        Ok(Statement::new(sql, params))
    }

    /// Like [`update`](Self::update) but only for the named columns.
    pub fn update_fields<S: AsRef<str>>(
        &self,
        fields: &FieldMap,
        columns: &[S],
        where_fmt: &str,
        where_params: Vec<Value>,
    ) -> Result<Statement> {
        self.update(&fields.select(columns), where_fmt, where_params)
    }

    /// `DELETE FROM t WHERE <where_fmt>`
    pub fn delete(&self, where_fmt: &str, where_params: Vec<Value>) -> Statement {
        let sql = format!("DELETE FROM {} WHERE {}", self.table(), where_fmt);
        Statement::new(sql, where_params)
    }

    /// Inserts or, on key conflict, re-assigns every column.
    ///
    /// Parameters are the insert values followed by the same values again.
    pub fn upsert(&self, fields: &FieldMap) -> Result<Statement> {
        if fields.is_empty() {
            return Err(Error::sql("nothing insert"));
        }
        self.upsert_with(fields, fields)
    }

    /// Inserts or, on key conflict, re-assigns only the named columns.
    pub fn upsert_fields<S: AsRef<str>>(
        &self,
        fields: &FieldMap,
        update_columns: &[S],
    ) -> Result<Statement> {
        if fields.is_empty() {
            return Err(Error::sql("nothing insert"));
        }
        let update = fields.select(update_columns);
        if update.is_empty() {
            return Err(Error::sql("nothing update"));
        }
        self.upsert_with(fields, &update)
    }

    fn upsert_with(&self, insert: &FieldMap, update: &FieldMap) -> Result<Statement> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) {} {}",
            self.table(),
            column_list(insert),
            placeholders(insert.len()),
            self.dialect.upsert_clause(),
            assignments(update)
        );
        let params = field_params(insert).chain(field_params(update)).collect();
        Ok(Statement::new(sql, params))
    }

    /// Multi-row `INSERT INTO`.
    pub fn batch_insert(&self, rows: &[FieldMap]) -> Result<Statement> {
        self.batch("INSERT INTO", rows)
    }

    /// Multi-row `REPLACE INTO`.
    pub fn batch_replace(&self, rows: &[FieldMap]) -> Result<Statement> {
        self.batch("REPLACE INTO", rows)
    }

    // The first row fixes the column order; every later row must carry all
    // of those columns. Extra columns on later rows are ignored.
    fn batch(&self, verb: &str, rows: &[FieldMap]) -> Result<Statement> {
        let Some(first) = rows.first() else {
            return Err(Error::sql("nothing insert"));
        };
        if first.is_empty() {
            return Err(Error::sql("nothing insert"));
        }
        let columns: Vec<&str> = first.columns().collect();
        let row_placeholders = format!("({})", placeholders(columns.len()));

        let mut params = Vec::with_capacity(columns.len() * rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            for column in &columns {
                let value = row.get(column).ok_or_else(|| {
                    Error::reflection(format!("row {index} is missing column `{column}`"))
                })?;
                params.push(value.to_param());
            }
            values.push(row_placeholders.as_str());
        }

        let sql = format!(
            "{verb} {} ({}) VALUES {}",
            self.table(),
            column_list(first),
            values.join(",")
        );
        Ok(Statement::new(sql, params))
    }

    /// `SELECT .. FROM t WHERE <predicate>`; no columns selects `*`.
    pub fn select<S: AsRef<str>>(&self, columns: &[S], predicate: Predicate) -> Statement {
        let columns = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| quote_ident(c.as_ref()))
                .collect::<Vec<_>>()
                .join(",")
        };
        let sql = format!(
            "SELECT {columns} FROM {} WHERE {}",
            self.table(),
            predicate.clause
        );
        Statement::new(sql, predicate.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::Text(v.to_string())).collect()
    }

    fn placeholder_count(sql: &str) -> usize {
        sql.matches('?').count()
    }

    fn ab() -> FieldMap {
        FieldMap::new().with("a", "1").with("b", "2")
    }

    #[test]
    fn insert_statement() {
        let stmt = StatementBuilder::new("t").insert(&ab()).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO `t` (`a`,`b`) VALUES (?,?)");
        assert_eq!(stmt.params, text(&["1", "2"]));
    }

    #[test]
    fn empty_maps_are_rejected() {
        let builder = StatementBuilder::new("t");
        let empty = FieldMap::new();
        assert_eq!(
            builder.insert(&empty).unwrap_err().to_string(),
            "sql error: nothing insert"
        );
        assert!(builder.update(&empty, "id = ?", vec![]).is_err());
        assert!(builder.upsert(&empty).is_err());
        assert!(builder.batch_insert(&[]).is_err());
        assert!(builder.batch_replace(&[empty]).is_err());
    }

    #[test]
    fn update_binds_fields_then_where() {
        let stmt = StatementBuilder::new("t")
            .update(&ab(), "id = ? AND v < ?", vec![Value::Integer(7), Value::Integer(3)])
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE `t` SET `a`=?,`b`=? WHERE id = ? AND v < ?");
        assert_eq!(
            stmt.params,
            vec![
                Value::Text("1".into()),
                Value::Text("2".into()),
                Value::Integer(7),
                Value::Integer(3)
            ]
        );
    }

    #[test]
    fn update_fields_filters_columns() {
        let builder = StatementBuilder::new("t");
        let stmt = builder
            .update_fields(&ab(), &["b"], "id = ?", vec![Value::Integer(1)])
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE `t` SET `b`=? WHERE id = ?");
        assert_eq!(stmt.params, vec![Value::Text("2".into()), Value::Integer(1)]);

        let err = builder
            .update_fields(&ab(), &["missing"], "id = ?", vec![])
            .unwrap_err();
        assert_eq!(err.to_string(), "sql error: nothing update");
    }

    #[test]
    fn delete_passes_where_params_verbatim() {
        let stmt = StatementBuilder::new("t")
            .delete("id IN (?,?)", vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(stmt.sql, "DELETE FROM `t` WHERE id IN (?,?)");
        assert_eq!(stmt.params, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn upsert_repeats_every_value() {
        let stmt = StatementBuilder::new("t").upsert(&ab()).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `t` (`a`,`b`) VALUES (?,?) ON DUPLICATE KEY UPDATE `a`=?,`b`=?"
        );
        assert_eq!(stmt.params.len(), 4);
        assert_eq!(stmt.params, text(&["1", "2", "1", "2"]));
    }

    #[test]
    fn upsert_fields_uses_the_subset() {
        let builder = StatementBuilder::new("t").with_dialect(Dialect::Sqlite);
        let stmt = builder.upsert_fields(&ab(), &["b"]).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `t` (`a`,`b`) VALUES (?,?) ON CONFLICT DO UPDATE SET `b`=?"
        );
        assert_eq!(stmt.params, text(&["1", "2", "2"]));

        let none: [&str; 0] = [];
        assert!(builder.upsert_fields(&ab(), &none).is_err());
        assert!(builder.upsert_fields(&FieldMap::new(), &["a"]).is_err());
    }

    #[test]
    fn batch_uses_first_row_column_order() {
        let rows = vec![
            ab(),
            FieldMap::new().with("b", "4").with("a", "3").with("extra", "x"),
        ];
        let stmt = StatementBuilder::new("t").batch_insert(&rows).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO `t` (`a`,`b`) VALUES (?,?),(?,?)");
        assert_eq!(stmt.params, text(&["1", "2", "3", "4"]));

        let stmt = StatementBuilder::new("t").batch_replace(&rows).unwrap();
        assert!(stmt.sql.starts_with("REPLACE INTO `t` (`a`,`b`) VALUES "));
    }

    #[test]
    fn batch_of_one_matches_single_row_insert() {
        let builder = StatementBuilder::new("t");
        assert_eq!(
            builder.batch_insert(&[ab()]).unwrap(),
            builder.insert(&ab()).unwrap()
        );
    }

    #[test]
    fn batch_row_missing_a_column_fails() {
        let rows = vec![ab(), FieldMap::new().with("a", "3")];
        let err = StatementBuilder::new("t").batch_insert(&rows).unwrap_err();
        assert!(matches!(err, Error::Reflection(ref m) if m.contains("`b`")));
    }

    #[test]
    fn byte_values_bind_as_blobs() {
        let fields = FieldMap::new().with("id", "1").with("raw", vec![0x00u8, 0xff]);
        let stmt = StatementBuilder::new("t").insert(&fields).unwrap();
        assert_eq!(
            stmt.params,
            vec![Value::Text("1".into()), Value::Blob(vec![0x00, 0xff])]
        );

        let stmt = StatementBuilder::new("t")
            .batch_insert(&[fields.clone(), fields])
            .unwrap();
        assert_eq!(stmt.params[3], Value::Blob(vec![0x00, 0xff]));
    }

    #[test]
    fn identifiers_are_escaped() {
        let fields = FieldMap::new().with("we`ird", "1");
        let stmt = StatementBuilder::new("ta`ble").insert(&fields).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO `ta``ble` (`we``ird`) VALUES (?)");
    }

    #[test]
    fn placeholder_and_param_counts_agree() {
        let builder = StatementBuilder::new("t");
        let rows = vec![ab(), ab(), ab()];
        let statements = vec![
            builder.insert(&ab()).unwrap(),
            builder.update(&ab(), "id = ?", vec![Value::Integer(1)]).unwrap(),
            builder.upsert(&ab()).unwrap(),
            builder.upsert_fields(&ab(), &["a"]).unwrap(),
            builder.batch_insert(&rows).unwrap(),
            builder.delete("id = ?", vec![Value::Integer(1)]),
        ];
        for stmt in statements {
            assert_eq!(placeholder_count(&stmt.sql), stmt.params.len(), "{}", stmt.sql);
        }
    }

    #[test]
    fn select_defaults_to_star() {
        let none: [&str; 0] = [];
        let stmt = StatementBuilder::new("t").select(&none, Predicate::always());
        assert_eq!(stmt.sql, "SELECT * FROM `t` WHERE 1=1");
        assert!(stmt.params.is_empty());

        let stmt = StatementBuilder::new("t").select(&["a", "b"], Predicate::always());
        assert_eq!(stmt.sql, "SELECT `a`,`b` FROM `t` WHERE 1=1");
    }
}
