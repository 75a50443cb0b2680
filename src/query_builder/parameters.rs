//! Named-parameter queries.
//!
//! Page queries are written with `:name` placeholders (`:last_id`, `:from_date`)
//! and compiled to PostgreSQL positional parameters (`$1`, `$2`) before
//! execution. `::type` casts, quoted literals, quoted identifiers and `--`
//! comments are left untouched.

use crate::error::{ReaderError, ReaderResult};
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryAs;
use std::collections::BTreeMap;

/// Named parameter values bound into a query
pub type QueryParameters = BTreeMap<String, Value>;

/// SQL text with `:name` placeholders and the values bound to them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedQuery {
    sql: String,
    parameters: QueryParameters,
}

/// A [`NamedQuery`] rewritten to positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

impl NamedQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: QueryParameters::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }

    /// Bind a value, replacing any previous value for the same name
    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Builder-style [`NamedQuery::set_parameter`]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_parameter(name, value);
        self
    }

    /// Bind every entry of `parameters`
    pub fn with_parameters(mut self, parameters: &QueryParameters) -> Self {
        for (name, value) in parameters {
            self.set_parameter(name.clone(), value.clone());
        }
        self
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        rewrite_placeholders(&self.sql, |name| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
            format!(":{name}")
        });
        names
    }

    /// Whether the SQL contains a `:name` placeholder
    pub fn references(&self, name: &str) -> bool {
        self.placeholders().iter().any(|n| n == name)
    }

    /// Rewrite to positional parameters; every placeholder must have a value and
    /// every value must be referenced
    pub fn compile(&self) -> ReaderResult<CompiledQuery> {
        let mut order: Vec<String> = Vec::new();
        let sql = rewrite_placeholders(&self.sql, |name| {
            let index = match order.iter().position(|n| n == name) {
                Some(index) => index,
                None => {
                    order.push(name.to_string());
                    order.len() - 1
                }
            };
            format!("${}", index + 1)
        });

        let mut values = Vec::with_capacity(order.len());
        for name in &order {
            let value = self.parameters.get(name).ok_or_else(|| {
                ReaderError::parameter(name.clone(), "no value bound for placeholder")
            })?;
            values.push(value.clone());
        }

        if let Some(unused) = self.parameters.keys().find(|name| !order.contains(name)) {
            return Err(ReaderError::parameter(
                unused.clone(),
                "value bound but not referenced by query",
            ));
        }

        Ok(CompiledQuery { sql, values })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace every `:name` placeholder with the output of `replace`
fn rewrite_placeholders(sql: &str, mut replace: impl FnMut(&str) -> String) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                // Quoted literal or identifier; doubled quotes re-enter the loop
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .map_or(chars.len(), |p| i + 1 + p + 1);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&n| n == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&n| !is_ident_char(n))
                    .map_or(chars.len(), |p| start + p);
                let name: String = chars[start..end].iter().collect();
                out.push_str(&replace(&name));
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Bind JSON values onto a sqlx query in positional order.
///
/// Integers must fit in `BIGINT`; larger unsigned values are rejected rather
/// than rounded through `f64`.
pub fn bind_values<'q, T>(
    mut query: QueryAs<'q, Postgres, T, PgArguments>,
    values: &[Value],
) -> ReaderResult<QueryAs<'q, Postgres, T, PgArguments>> {
    for (index, value) in values.iter().enumerate() {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.is_f64()) {
                (Some(i), _) => query.bind(i),
                (None, true) => query.bind(n.as_f64()),
                (None, false) => {
                    return Err(ReaderError::parameter(
                        format!("${}", index + 1),
                        format!("integer {n} does not fit in BIGINT"),
                    ))
                }
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(sqlx::types::Json(other.clone())),
        };
    }
    Ok(query)
}
