//! Values bound to statements, converted from serde_json::Value.

use crate::error::{Error, Result};
use crate::schema::LogicalType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// A value that can be bound to a statement on any supported driver.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Uuid(uuid::Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Bytes(Vec<u8>),
    Json(Value),
}

impl BindValue {
    /// Untyped conversion used for raw queries and filter literals.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else if let Some(f) = n.as_f64() {
                    BindValue::F64(f)
                } else {
                    BindValue::I64(n.as_i64().unwrap_or(0))
                }
            }
            Value::String(s) => {
                if let Ok(u) = uuid::Uuid::parse_str(s) {
                    BindValue::Uuid(u)
                } else {
                    BindValue::String(s.clone())
                }
            }
            Value::Array(_) | Value::Object(_) => BindValue::Json(v.clone()),
        }
    }

    /// Typed conversion for declared command parameters.
    pub fn coerce(v: &Value, ty: LogicalType) -> Result<Self> {
        if v.is_null() {
            return Ok(BindValue::Null);
        }
        let mismatch = || Error::translation(format!("value {} is not a valid {}", v, ty));
        Ok(match ty {
            LogicalType::String => match v {
                Value::String(s) => BindValue::String(s.clone()),
                Value::Number(_) | Value::Bool(_) => BindValue::String(v.to_string()),
                _ => return Err(mismatch()),
            },
            LogicalType::Integer => match v {
                Value::Number(n) => BindValue::I64(n.as_i64().ok_or_else(mismatch)?),
                Value::String(s) => BindValue::I64(s.trim().parse().map_err(|_| mismatch())?),
                _ => return Err(mismatch()),
            },
            LogicalType::Float => match v {
                Value::Number(n) => BindValue::F64(n.as_f64().ok_or_else(mismatch)?),
                Value::String(s) => BindValue::F64(s.trim().parse().map_err(|_| mismatch())?),
                _ => return Err(mismatch()),
            },
            LogicalType::Decimal => match v {
                Value::Number(n) => BindValue::Decimal(Decimal::from_str(&n.to_string()).map_err(|_| mismatch())?),
                Value::String(s) => BindValue::Decimal(Decimal::from_str(s.trim()).map_err(|_| mismatch())?),
                _ => return Err(mismatch()),
            },
            LogicalType::Boolean => match v {
                Value::Bool(b) => BindValue::Bool(*b),
                Value::Number(n) => BindValue::Bool(n.as_i64().ok_or_else(mismatch)? != 0),
                Value::String(s) if s.eq_ignore_ascii_case("true") => BindValue::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => BindValue::Bool(false),
                _ => return Err(mismatch()),
            },
            LogicalType::DateTime => {
                let s = v.as_str().ok_or_else(mismatch)?;
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    BindValue::DateTime(dt.with_timezone(&Utc))
                } else {
                    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                        .map_err(|_| mismatch())?;
                    BindValue::DateTime(naive.and_utc())
                }
            }
            LogicalType::Date => {
                let s = v.as_str().ok_or_else(mismatch)?;
                BindValue::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch())?)
            }
            LogicalType::Time => {
                let s = v.as_str().ok_or_else(mismatch)?;
                BindValue::Time(NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| mismatch())?)
            }
            LogicalType::Uuid => {
                let s = v.as_str().ok_or_else(mismatch)?;
                BindValue::Uuid(uuid::Uuid::parse_str(s).map_err(|_| mismatch())?)
            }
            LogicalType::Json => BindValue::Json(v.clone()),
            LogicalType::Binary => match v {
                Value::Array(items) => BindValue::Bytes(
                    items
                        .iter()
                        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                        .collect::<Option<Vec<u8>>>()
                        .ok_or_else(mismatch)?,
                ),
                Value::String(s) => BindValue::Bytes(s.as_bytes().to_vec()),
                _ => return Err(mismatch()),
            },
        })
    }

    /// Zero value of a value type; null for the rest.
    pub fn zero(ty: LogicalType) -> Self {
        match ty {
            LogicalType::Integer => BindValue::I64(0),
            LogicalType::Float => BindValue::F64(0.0),
            LogicalType::Decimal => BindValue::Decimal(Decimal::ZERO),
            LogicalType::Boolean => BindValue::Bool(false),
            LogicalType::DateTime => BindValue::DateTime(DateTime::<Utc>::default()),
            LogicalType::Date => BindValue::Date(NaiveDate::default()),
            LogicalType::Time => BindValue::Time(NaiveTime::default()),
            LogicalType::Uuid => BindValue::Uuid(uuid::Uuid::nil()),
            LogicalType::String | LogicalType::Json | LogicalType::Binary => BindValue::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untyped_conversion() {
        assert_eq!(BindValue::from_json(&json!(null)), BindValue::Null);
        assert_eq!(BindValue::from_json(&json!(3)), BindValue::I64(3));
        assert_eq!(BindValue::from_json(&json!(1.5)), BindValue::F64(1.5));
        assert_eq!(BindValue::from_json(&json!("abc")), BindValue::String("abc".into()));
        assert!(matches!(
            BindValue::from_json(&json!("67e55044-10b1-426f-9247-bb680e5fe0c8")),
            BindValue::Uuid(_)
        ));
        assert!(matches!(BindValue::from_json(&json!({"a": 1})), BindValue::Json(_)));
    }

    #[test]
    fn typed_conversion() {
        assert_eq!(BindValue::coerce(&json!("42"), LogicalType::Integer).unwrap(), BindValue::I64(42));
        assert_eq!(BindValue::coerce(&json!(1), LogicalType::Boolean).unwrap(), BindValue::Bool(true));
        assert_eq!(
            BindValue::coerce(&json!("12.50"), LogicalType::Decimal).unwrap(),
            BindValue::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            BindValue::coerce(&json!("2024-02-29"), LogicalType::Date).unwrap(),
            BindValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(matches!(
            BindValue::coerce(&json!("2024-02-29T10:00:00Z"), LogicalType::DateTime).unwrap(),
            BindValue::DateTime(_)
        ));
        assert_eq!(BindValue::coerce(&json!(null), LogicalType::Integer).unwrap(), BindValue::Null);
    }

    #[test]
    fn typed_conversion_rejects_mismatches() {
        assert!(matches!(BindValue::coerce(&json!("x"), LogicalType::Integer), Err(Error::Translation(_))));
        assert!(BindValue::coerce(&json!(1.5), LogicalType::Integer).is_err());
        assert!(BindValue::coerce(&json!([1, 300]), LogicalType::Binary).is_err());
        assert!(BindValue::coerce(&json!({}), LogicalType::String).is_err());
    }

    #[test]
    fn zero_values() {
        assert_eq!(BindValue::zero(LogicalType::Integer), BindValue::I64(0));
        assert_eq!(BindValue::zero(LogicalType::Boolean), BindValue::Bool(false));
        assert_eq!(BindValue::zero(LogicalType::Uuid), BindValue::Uuid(uuid::Uuid::nil()));
        assert_eq!(BindValue::zero(LogicalType::String), BindValue::Null);
        assert_eq!(BindValue::zero(LogicalType::Json), BindValue::Null);
    }
}
