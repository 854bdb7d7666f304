//! SQL statement builders for the meta tables.
//!
//! Each builder produces one statement with positional `?` placeholders and
//! its parameter list. Keys are mapped to stored keys here, so backends never
//! see a raw record path.

use crate::types::MetaRow;

use super::table::Destination;

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

/// SQL text plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn object_param(dest: &Destination) -> Option<SqlParam> {
    dest.object_value().map(|id| SqlParam::Int(id as i64))
}

/// `SELECT id, key, value ... WHERE key IN (...) [AND object = ?] ORDER BY id`.
pub fn select(dest: &Destination, keys: &[String]) -> Statement {
    let t = &dest.table;
    let mut params: Vec<SqlParam> = keys
        .iter()
        .map(|k| SqlParam::Text(dest.storage_key(k)))
        .collect();

    let mut sql = format!(
        "SELECT {}, {}, {} FROM {} WHERE {} IN ({})",
        t.id_column,
        t.key_column,
        t.value_column,
        t.name,
        t.key_column,
        placeholders(keys.len())
    );
    if let (Some(col), Some(p)) = (t.object_column, object_param(dest)) {
        sql.push_str(&format!(" AND {col} = ?"));
        params.push(p);
    }
    sql.push_str(&format!(" ORDER BY {} ASC", t.id_column));

    Statement { sql, params }
}

/// One multi-row `INSERT ... VALUES (...), (...)`.
pub fn insert(dest: &Destination, rows: &[MetaRow]) -> Statement {
    let t = &dest.table;
    let object = object_param(dest);
    let mut params = Vec::with_capacity(rows.len() * 3);
    let mut tuples = Vec::with_capacity(rows.len());

    for row in rows {
        if let Some(p) = &object {
            params.push(p.clone());
            tuples.push("(?, ?, ?)");
        } else {
            tuples.push("(?, ?)");
        }
        params.push(SqlParam::Text(dest.storage_key(&row.meta_key)));
        params.push(SqlParam::Text(row.meta_value.clone()));
    }

    let columns = match (t.object_column, &object) {
        (Some(col), Some(_)) => format!("{col}, {}, {}", t.key_column, t.value_column),
        _ => format!("{}, {}", t.key_column, t.value_column),
    };

    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES {}",
            t.name,
            columns,
            tuples.join(", ")
        ),
        params,
    }
}

/// One `UPDATE ... SET value = CASE key WHEN ? THEN ? ... END WHERE key IN (...)`.
pub fn update(dest: &Destination, rows: &[MetaRow]) -> Statement {
    let t = &dest.table;
    let mut params = Vec::with_capacity(rows.len() * 3 + 1);

    let mut case = format!("CASE {}", t.key_column);
    for row in rows {
        case.push_str(" WHEN ? THEN ?");
        params.push(SqlParam::Text(dest.storage_key(&row.meta_key)));
        params.push(SqlParam::Text(row.meta_value.clone()));
    }
    case.push_str(" END");

    for row in rows {
        params.push(SqlParam::Text(dest.storage_key(&row.meta_key)));
    }

    let mut sql = format!(
        "UPDATE {} SET {} = {} WHERE {} IN ({})",
        t.name,
        t.value_column,
        case,
        t.key_column,
        placeholders(rows.len())
    );
    if let (Some(col), Some(p)) = (t.object_column, object_param(dest)) {
        sql.push_str(&format!(" AND {col} = ?"));
        params.push(p);
    }

    Statement { sql, params }
}

/// `DELETE` scoped to exactly one `(object, key)` pair.
pub fn delete(dest: &Destination, key: &str) -> Statement {
    let t = &dest.table;
    let mut params = vec![SqlParam::Text(dest.storage_key(key))];
    let mut sql = format!("DELETE FROM {} WHERE {} = ?", t.name, t.key_column);
    if let (Some(col), Some(p)) = (t.object_column, object_param(dest)) {
        sql.push_str(&format!(" AND {col} = ?"));
        params.push(p);
    }
    Statement { sql, params }
}
