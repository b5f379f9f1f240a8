//! Typed metadata filters.
//!
//! A [`Filters`] value is a conjunction of per-key [`FilterExpr`]s evaluated
//! against a memory's metadata. The same filters are evaluated in Rust
//! ([`Filters::matches`]) and compiled to SQL for index-side pushdown
//! ([`Filters::to_sql`]). Both forms accept exactly the same rows, so an index
//! can apply its `LIMIT` after filtering without starving the result.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::types::Metadata;

/// A scalar filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl FilterValue {
    /// Parse a CLI-style scalar: `true`/`false`, then numbers, then text.
    pub fn parse_scalar(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => match raw.parse::<f64>() {
                Ok(n) if n.is_finite() => Self::Number(n),
                _ => Self::Text(raw.to_string()),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
        }
    }

    /// Order against a stored JSON value. `None` when the types differ.
    fn cmp_json(&self, stored: &Value) -> Option<Ordering> {
        match (self, stored) {
            (Self::Text(a), Value::String(b)) => Some(b.as_str().cmp(a.as_str())),
            (Self::Number(a), Value::Number(b)) => b.as_f64()?.partial_cmp(a),
            (Self::Bool(a), Value::Bool(b)) => Some(b.cmp(a)),
            _ => None,
        }
    }

    fn to_sql(&self) -> SqlValue {
        match self {
            Self::Text(s) => SqlValue::Text(s.clone()),
            Self::Number(n) => SqlValue::Real(*n),
            // json_each reports JSON booleans as atoms 1/0
            Self::Bool(b) => SqlValue::Integer(i64::from(*b)),
        }
    }

    /// `json_each` types comparable with this operand.
    fn sql_types(&self) -> &'static str {
        match self {
            Self::Text(_) => "('text')",
            Self::Number(_) => "('integer', 'real')",
            Self::Bool(_) => "('true', 'false')",
        }
    }

    /// `j.atom <op> ?`, guarded so only stored values of the same JSON type
    /// compare. SQLite otherwise orders text above every number and reads
    /// `true` as 1.
    fn sql_compare(&self, op: &str, params: &mut Vec<SqlValue>) -> String {
        params.push(self.to_sql());
        format!("(j.type IN {} AND j.atom {op} ?)", self.sql_types())
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Predicate over a single metadata key.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Stored value equals the operand.
    Eq(FilterValue),
    /// Stored value lies within the inclusive bounds. A missing bound is open.
    Range {
        min: Option<FilterValue>,
        max: Option<FilterValue>,
    },
    /// Stored value equals any operand. An empty set matches nothing.
    In(Vec<FilterValue>),
}

impl FilterExpr {
    fn matches(&self, stored: &Value) -> bool {
        match self {
            Self::Eq(v) => v.cmp_json(stored) == Some(Ordering::Equal),
            Self::Range { min, max } => {
                let above_min = min.as_ref().map_or(true, |lo| {
                    matches!(lo.cmp_json(stored), Some(Ordering::Greater | Ordering::Equal))
                });
                let below_max = max.as_ref().map_or(true, |hi| {
                    matches!(hi.cmp_json(stored), Some(Ordering::Less | Ordering::Equal))
                });
                // a Range with no bounds still requires a comparable scalar
                let comparable = !matches!(stored, Value::Null | Value::Array(_) | Value::Object(_));
                comparable && above_min && below_max
            }
            Self::In(values) => values
                .iter()
                .any(|v| v.cmp_json(stored) == Some(Ordering::Equal)),
        }
    }

    fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            Self::Eq(v) => v.sql_compare("=", params),
            Self::Range { min, max } => {
                let mut parts = vec![
                    "j.type IN ('integer', 'real', 'text', 'true', 'false')".to_string(),
                ];
                if let Some(lo) = min {
                    parts.push(lo.sql_compare(">=", params));
                }
                if let Some(hi) = max {
                    parts.push(hi.sql_compare("<=", params));
                }
                parts.join(" AND ")
            }
            Self::In(values) if values.is_empty() => "0".to_string(),
            Self::In(values) => {
                let any: Vec<String> = values.iter().map(|v| v.sql_compare("=", params)).collect();
                format!("({})", any.join(" OR "))
            }
        }
    }
}

/// Conjunction of per-key predicates. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    exprs: BTreeMap<String, FilterExpr>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the predicate for `key`.
    pub fn with(mut self, key: impl Into<String>, expr: FilterExpr) -> Self {
        self.exprs.insert(key.into(), expr);
        self
    }

    /// Shorthand for an equality predicate.
    pub fn eq(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(key, FilterExpr::Eq(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Evaluate against a memory's metadata. A missing key never matches.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.exprs.iter().all(|(key, expr)| {
            metadata
                .get(key)
                .is_some_and(|stored| expr.matches(stored))
        })
    }

    /// Compile to `AND ...` clauses over the JSON object in `column`.
    ///
    /// Each key becomes an `EXISTS` over `json_each`, so any key text binds as a
    /// plain parameter. Metadata that is not valid JSON has no keys, matching
    /// how [`Filters::matches`] sees it.
    pub(crate) fn to_sql(&self, column: &str) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        let mut params = Vec::new();

        for (key, expr) in &self.exprs {
            params.push(SqlValue::Text(key.clone()));
            let predicate = expr.to_sql(&mut params);
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM json_each(CASE WHEN json_valid({column}) \
                 THEN {column} END) AS j WHERE j.key = ? AND {predicate})"
            ));
        }

        (sql, params)
    }
}

impl From<std::collections::HashMap<String, String>> for Filters {
    fn from(map: std::collections::HashMap<String, String>) -> Self {
        map.into_iter()
            .fold(Filters::new(), |f, (k, v)| f.eq(k, FilterValue::Text(v)))
    }
}
