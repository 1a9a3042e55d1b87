//! Compile conditions into a document-store filter.

use crate::clause::Condition;
use crate::operator::Operator;
use polystore_core::{Document, Value};
use serde_json::{Map, json};

/// Translate a SQL `LIKE` pattern into an anchored regular expression.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

fn expression(condition: &Condition) -> Value {
    match condition {
        Condition::Compare {
            op: Operator::Eq,
            value,
            ..
        } => value.clone(),
        Condition::Compare {
            op: op @ (Operator::Like | Operator::NotLike),
            value,
            ..
        } => {
            let pattern = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            let matcher = json!({ "$regex": like_to_regex(&pattern) });
            if *op == Operator::Like {
                Value::Json(matcher)
            } else {
                Value::Json(json!({ "$not": matcher }))
            }
        }
        Condition::Compare { op, value, .. } => {
            let mut map = Map::new();
            map.insert(op.as_document_op().to_string(), value.to_json());
            Value::Json(serde_json::Value::Object(map))
        }
        Condition::In { values, .. } => Value::Json(json!({
            "$in": values.iter().map(Value::to_json).collect::<Vec<_>>()
        })),
        Condition::Null(_) => Value::Null,
        Condition::NotNull(_) => Value::Json(json!({ "$ne": null })),
    }
}

/// Build one filter document. Conditions on distinct fields share a flat
/// document; a repeated field turns the whole filter into an `$and` list.
pub fn compile(conditions: &[Condition]) -> Document {
    let mut seen = std::collections::HashSet::new();
    let repeated = conditions.iter().any(|c| !seen.insert(c.column()));
    if !repeated {
        return conditions
            .iter()
            .map(|c| (c.column().to_string(), expression(c)))
            .collect();
    }
    let clauses: Vec<serde_json::Value> = conditions
        .iter()
        .map(|c| {
            let mut clause = Map::new();
            clause.insert(c.column().to_string(), expression(c).to_json());
            serde_json::Value::Object(clause)
        })
        .collect();
    Document::new().with("$and", Value::Json(serde_json::Value::Array(clauses)))
}
