//! Query values and parameter encoding.

use std::fmt;

/// A query parameter, encoded as a text-format wire value when dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL NULL
    Null,
    /// Boolean, sent as `t` / `f`
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
}

impl Param {
    /// Encode as the text-format value the native layer expects.
    /// `None` is SQL NULL.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Param::Null => None,
            Param::Bool(true) => Some("t".to_string()),
            Param::Bool(false) => Some("f".to_string()),
            Param::Int(v) => Some(v.to_string()),
            Param::Float(v) => Some(v.to_string()),
            Param::Text(v) => Some(v.clone()),
        }
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int(i64::from(v))
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

/// An immutable query value: SQL text plus an ordered parameter list.
///
/// The SQL is expected to carry positional placeholders (`$1`, `$2`, ..)
/// matching the parameter list; placeholder rewriting is the job of an
/// upstream SQL builder, not of this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Param>,
}

impl Query {
    /// Create a query from SQL text and parameters.
    pub fn new(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The ordered parameter list.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Encode all parameters as text-format wire values.
    pub fn wire_params(&self) -> Vec<Option<String>> {
        self.params.iter().map(Param::to_wire).collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Input accepted by the query entry points: raw SQL or a prebuilt [`Query`].
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// Raw SQL text, combined with the params given at the call site
    Sql(String),
    /// A prebuilt query; passing extra params alongside is a contract
    /// violation
    Prebuilt(Query),
}

impl From<&str> for QuerySource {
    fn from(sql: &str) -> Self {
        QuerySource::Sql(sql.to_string())
    }
}

impl From<String> for QuerySource {
    fn from(sql: String) -> Self {
        QuerySource::Sql(sql)
    }
}

impl From<Query> for QuerySource {
    fn from(query: Query) -> Self {
        QuerySource::Prebuilt(query)
    }
}

impl QuerySource {
    /// Normalize into a [`Query`].
    ///
    /// Fails with [`Error::CantPassParams`](crate::Error::CantPassParams)
    /// when a prebuilt query arrives together with a non-empty parameter
    /// list; the two are never merged.
    pub fn normalize(self, params: Vec<Param>) -> crate::error::Result<Query> {
        match self {
            QuerySource::Sql(sql) => Ok(Query::new(sql, params)),
            QuerySource::Prebuilt(query) => {
                if params.is_empty() {
                    Ok(query)
                } else {
                    Err(crate::error::Error::CantPassParams)
                }
            }
        }
    }
}
