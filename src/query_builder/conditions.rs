/// Represents different types of SQL conditions
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Literal comparison, value rendered inline
    Simple {
        field: String,
        operator: String,
        value: serde_json::Value,
    },
    /// Comparison against a positional bound parameter (`$position`)
    Bound {
        field: String,
        operator: String,
        position: usize,
    },
}

impl Condition {
    /// Convert condition to SQL string
    pub fn to_sql(&self) -> String {
        match self {
            Condition::Simple {
                field,
                operator,
                value,
            } => {
                format!("{} {} {}", field, operator, format_value(value))
            }
            Condition::Bound {
                field,
                operator,
                position,
            } => {
                format!("{field} {operator} ${position}")
            }
        }
    }
}

/// Conditions joined with AND
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub conditions: Vec<Condition>,
}

impl WhereClause {
    /// Create a simple WHERE clause with a single condition
    pub fn simple(field: &str, operator: &str, value: serde_json::Value) -> Self {
        Self::and(vec![Condition::Simple {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }])
    }

    /// Create a comparison against positional parameter `position`
    pub fn bound(field: &str, operator: &str, position: usize) -> Self {
        Self::and(vec![Condition::Bound {
            field: field.to_string(),
            operator: operator.to_string(),
            position,
        }])
    }

    /// Combine multiple conditions with AND
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    /// Convert to SQL string
    pub fn to_sql(&self) -> String {
        match self.conditions.as_slice() {
            [] => "1=1".to_string(),
            [single] => single.to_sql(),
            conditions => {
                let parts: Vec<String> = conditions.iter().map(Condition::to_sql).collect();
                format!("({})", parts.join(" AND "))
            }
        }
    }
}

/// Format a JSON value for SQL
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        _ => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}
