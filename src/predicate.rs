//! WHERE clause construction from loosely-typed condition maps.
//!
//! A condition map associates a column with either a plain value (implicit
//! equality) or an operator object `{ "type": ">", "value": 10 }`:
//!
//! ```json
//! { "status": "active" }                                 // `status` = ?
//! { "age": { "type": ">=", "value": 18 } }               // `age` >= ?
//! { "id": { "type": "not in", "value": [1, 2, 3] } }     // `id` NOT IN (?,?,?)
//! ```
//!
//! Terms are ANDed onto the tautology `1=1`, so an empty map matches every row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::scalar::Value;
use crate::statement::quote_ident;

/// Tautological base of every predicate.
pub const ALWAYS: &str = "1=1";

/// A WHERE clause fragment and its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    /// The predicate that matches every row.
    pub fn always() -> Self {
        Self {
            clause: ALWAYS.to_string(),
            params: Vec::new(),
        }
    }

    fn and(&mut self, term: &str) {
        self.clause.push_str(" AND ");
        self.clause.push_str(term);
    }
}

/// How unrecognized operators and malformed conditions are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateMode {
    /// Fail with [`Error::Predicate`].
    #[default]
    Strict,
    /// Drop the condition and keep going.
    Lenient,
}

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereOperator {
    Eq,
    Gt,
    Lt,
    Lte,
    Gte,
    Ne,
    Like,
    In,
    NotIn,
}

impl WhereOperator {
    /// Parses an operator name, ignoring case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "=" => Some(WhereOperator::Eq),
            ">" => Some(WhereOperator::Gt),
            "<" => Some(WhereOperator::Lt),
            "<=" => Some(WhereOperator::Lte),
            ">=" => Some(WhereOperator::Gte),
            "<>" => Some(WhereOperator::Ne),
            "like" => Some(WhereOperator::Like),
            "in" => Some(WhereOperator::In),
            "not in" => Some(WhereOperator::NotIn),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WhereOperator::Eq => "=",
            WhereOperator::Gt => ">",
            WhereOperator::Lt => "<",
            WhereOperator::Lte => "<=",
            WhereOperator::Gte => ">=",
            WhereOperator::Ne => "<>",
            WhereOperator::Like => "like",
            WhereOperator::In => "in",
            WhereOperator::NotIn => "not in",
        }
    }

    fn sql(self) -> &'static str {
        match self {
            WhereOperator::Like => "LIKE",
            WhereOperator::In => "IN",
            WhereOperator::NotIn => "NOT IN",
            other => other.as_str(),
        }
    }

    fn is_set(self) -> bool {
        matches!(self, WhereOperator::In | WhereOperator::NotIn)
    }
}

/// Condition map keyed by column name.
///
/// Columns are visited in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(pub Map<String, Json>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds an implicit equality condition.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Json>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Adds an explicit operator condition.
    pub fn op(
        mut self,
        column: impl Into<String>,
        op: WhereOperator,
        value: impl Into<Json>,
    ) -> Self {
        let mut condition = Map::new();
        condition.insert("type".to_string(), Json::from(op.as_str()));
        condition.insert("value".to_string(), value.into());
        self.0.insert(column.into(), Json::Object(condition));
        self
    }
}

impl From<Map<String, Json>> for Conditions {
    fn from(map: Map<String, Json>) -> Self {
        Self(map)
    }
}

impl TryFrom<Json> for Conditions {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self> {
        match value {
            Json::Object(map) => Ok(Self(map)),
            Json::Null => Ok(Self::default()),
            other => Err(Error::Predicate(format!(
                "condition map must be an object, got {other}"
            ))),
        }
    }
}

/// Builds a predicate in [`PredicateMode::Strict`].
pub fn build_predicate(conditions: &Conditions) -> Result<Predicate> {
    build_predicate_with(conditions, PredicateMode::Strict)
}

/// Builds a predicate, handling bad conditions according to `mode`.
pub fn build_predicate_with(conditions: &Conditions, mode: PredicateMode) -> Result<Predicate> {
    let mut predicate = Predicate::always();
    for (column, condition) in &conditions.0 {
        match push_condition(&mut predicate, column, condition) {
            Ok(()) => {}
            Err(_) if mode == PredicateMode::Lenient => {}
            Err(err) => return Err(err),
        }
    }
    Ok(predicate)
}

fn push_condition(predicate: &mut Predicate, column: &str, condition: &Json) -> Result<()> {
    let column_sql = quote_ident(column);
    match condition {
        Json::Object(object) => {
            let (Some(op), Some(value)) = (object.get("type"), object.get("value")) else {
                return Err(Error::Predicate(format!(
                    "condition on `{column}` needs both `type` and `value`"
                )));
            };
            let op = op
                .as_str()
                .and_then(WhereOperator::parse)
                .ok_or_else(|| Error::Predicate(format!("unknown operator {op} on `{column}`")))?;

            if op.is_set() {
                let Json::Array(items) = value else {
                    return Err(Error::Predicate(format!(
                        "`{}` on `{column}` expects a list",
                        op.as_str()
                    )));
                };
                let values = items
                    .iter()
                    .map(|item| scalar(column, item))
                    .collect::<Result<Vec<_>>>()?;
                // An empty set: IN matches nothing, NOT IN matches everything.
                if values.is_empty() {
                    if op == WhereOperator::In {
                        predicate.and("1=0");
                    }
                    return Ok(());
                }
                let placeholders = vec!["?"; values.len()].join(",");
                predicate.and(&format!("{column_sql} {} ({placeholders})", op.sql()));
                predicate.params.extend(values);
            } else {
                let value = scalar(column, value)?;
                predicate.and(&format!("{column_sql} {} ?", op.sql()));
                predicate.params.push(value);
            }
        }
        Json::Null => predicate.and(&format!("{column_sql} IS NULL")),
        other => {
            let value = scalar(column, other)?;
            predicate.and(&format!("{column_sql} = ?"));
            predicate.params.push(value);
        }
    }
    Ok(())
}

fn scalar(column: &str, value: &Json) -> Result<Value> {
    Ok(match value {
        Json::String(s) => Value::Text(s.clone()),
        Json::Bool(b) => Value::Integer(i64::from(*b)),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Integer(i),
            // u64 beyond i64::MAX keeps its exact digits.
            (None, _) if n.is_u64() => Value::Text(n.to_string()),
            (None, Some(f)) => Value::Real(f),
            (None, None) => Value::Text(n.to_string()),
        },
        Json::Null => Value::Null,
        Json::Array(_) | Json::Object(_) => {
            return Err(Error::Predicate(format!(
                "unsupported value {value} on `{column}`"
            )))
        }
    })
}
