//! Result value normalization.
//!
//! Every scalar coming back from the datastore is converted into the closed
//! [`Value`] set so downstream consumers never see datastore-native types:
//! temporals become ISO-8601 strings, binary becomes lower-hex, json becomes
//! nested values. Normalization never fails a query; a cell the driver
//! cannot decode becomes an explicit null with a warning.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{Kind, Type};
use tokio_postgres::Row;
use tracing::warn;
use uuid::Uuid;

use crate::query::Value;

/// Portable name for a result column's type.
pub fn portable_type_name(ty: &Type) -> String {
    if let Kind::Array(_) = ty.kind() {
        return "array".to_string();
    }

    if *ty == Type::BOOL {
        "boolean"
    } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
        "integer"
    } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
        "float"
    } else if *ty == Type::NUMERIC {
        "numeric"
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UUID
    {
        "string"
    } else if *ty == Type::DATE {
        "date"
    } else if *ty == Type::TIME {
        "time"
    } else if *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ {
        "timestamp"
    } else if *ty == Type::BYTEA {
        "binary"
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        "json"
    } else {
        return ty.name().to_string();
    }
    .to_string()
}

/// Normalize one row into result cells, in column order.
pub fn normalize_row(row: &Row) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| normalize_cell(row, idx))
        .collect()
}

fn normalize_cell(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_().clone();

    if *ty.kind() == Kind::Simple {
        if ty == Type::BOOL {
            return opt(row.try_get::<_, Option<bool>>(idx), &ty).map_or(Value::Null, Value::Bool);
        }
        if ty == Type::INT2 {
            return opt(row.try_get::<_, Option<i16>>(idx), &ty)
                .map_or(Value::Null, |v| Value::Int(v as i64));
        }
        if ty == Type::INT4 {
            return opt(row.try_get::<_, Option<i32>>(idx), &ty)
                .map_or(Value::Null, |v| Value::Int(v as i64));
        }
        if ty == Type::INT8 {
            return opt(row.try_get::<_, Option<i64>>(idx), &ty).map_or(Value::Null, Value::Int);
        }
        if ty == Type::FLOAT4 {
            return opt(row.try_get::<_, Option<f32>>(idx), &ty)
                .map_or(Value::Null, |v| Value::Float(v as f64));
        }
        if ty == Type::FLOAT8 {
            return opt(row.try_get::<_, Option<f64>>(idx), &ty).map_or(Value::Null, Value::Float);
        }
        if ty == Type::NUMERIC {
            return opt(row.try_get::<_, Option<Decimal>>(idx), &ty)
                .map_or(Value::Null, |d| match d.to_f64() {
                    Some(f) => Value::Float(f),
                    None => Value::Str(d.to_string()),
                });
        }
        if ty == Type::TEXT || ty == Type::VARCHAR || ty == Type::BPCHAR || ty == Type::NAME {
            return opt(row.try_get::<_, Option<String>>(idx), &ty)
                .map_or(Value::Null, Value::Str);
        }
        if ty == Type::UUID {
            return opt(row.try_get::<_, Option<Uuid>>(idx), &ty)
                .map_or(Value::Null, |u| Value::Str(u.to_string()));
        }
        if ty == Type::DATE {
            return opt(row.try_get::<_, Option<NaiveDate>>(idx), &ty)
                .map_or(Value::Null, |d| Value::Str(d.format("%Y-%m-%d").to_string()));
        }
        if ty == Type::TIME {
            return opt(row.try_get::<_, Option<NaiveTime>>(idx), &ty)
                .map_or(Value::Null, |t| {
                    Value::Str(t.format("%H:%M:%S%.f").to_string())
                });
        }
        if ty == Type::TIMESTAMP {
            return opt(row.try_get::<_, Option<NaiveDateTime>>(idx), &ty)
                .map_or(Value::Null, |t| {
                    Value::Str(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
                });
        }
        if ty == Type::TIMESTAMPTZ {
            return opt(row.try_get::<_, Option<DateTime<Utc>>>(idx), &ty)
                .map_or(Value::Null, |t| Value::Str(t.to_rfc3339()));
        }
        if ty == Type::BYTEA {
            return opt(row.try_get::<_, Option<Vec<u8>>>(idx), &ty)
                .map_or(Value::Null, |bytes| Value::Str(to_hex(&bytes)));
        }
        if ty == Type::JSON || ty == Type::JSONB {
            return opt(row.try_get::<_, Option<serde_json::Value>>(idx), &ty)
                .map_or(Value::Null, Value::from);
        }
    }

    if let Kind::Array(_) = ty.kind() {
        return normalize_array(row, idx, &ty);
    }

    // Unknown type: attempt the text representation, otherwise null.
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(s)) => Value::Str(s),
        Ok(None) => Value::Null,
        Err(_) => {
            warn!(column_type = ty.name(), "could not normalize value; returning null");
            Value::Null
        }
    }
}

fn normalize_array(row: &Row, idx: usize, ty: &Type) -> Value {
    if *ty == Type::TEXT_ARRAY || *ty == Type::VARCHAR_ARRAY {
        return opt(row.try_get::<_, Option<Vec<String>>>(idx), ty)
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::Str).collect())
            });
    }
    if *ty == Type::INT4_ARRAY {
        return opt(row.try_get::<_, Option<Vec<i32>>>(idx), ty)
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(|v| Value::Int(v as i64)).collect())
            });
    }
    if *ty == Type::INT8_ARRAY {
        return opt(row.try_get::<_, Option<Vec<i64>>>(idx), ty)
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::Int).collect())
            });
    }
    if *ty == Type::FLOAT8_ARRAY {
        return opt(row.try_get::<_, Option<Vec<f64>>>(idx), ty)
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::Float).collect())
            });
    }
    if *ty == Type::BOOL_ARRAY {
        return opt(row.try_get::<_, Option<Vec<bool>>>(idx), ty)
            .map_or(Value::Null, |items| {
                Value::Array(items.into_iter().map(Value::Bool).collect())
            });
    }

    warn!(column_type = ty.name(), "unsupported array type; returning null");
    Value::Null
}

fn opt<T>(result: Result<Option<T>, tokio_postgres::Error>, ty: &Type) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(column_type = ty.name(), error = %err, "could not decode value; returning null");
            None
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
