//! Conversion of PostgreSQL row cells to JSON values.
//!
//! Values that JSON cannot represent losslessly (numeric, money, dates and
//! times, bytea) become strings in PostgreSQL's own text style. SQL NULL is
//! always `null`. Types without a conversion render as `"<typename>"`.

use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value as JsonValue};
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::models::ResultRow;

type BoxError = Box<dyn Error + Sync + Send>;

/// Convert a whole row to a column-name-keyed map, in column order.
///
/// Later columns win when a result has duplicate column names.
pub fn row_to_json(row: &Row) -> ResultRow {
    let mut map = Map::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_json(row, i));
    }
    map
}

/// Convert the cell at `idx` to JSON.
pub fn cell_to_json(row: &Row, idx: usize) -> JsonValue {
    let ty = row.columns()[idx].type_();
    match convert(row, idx, ty) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(column = idx, type_name = %ty.name(), error = %e, "Value not convertible");
            unsupported(ty)
        }
    }
}

fn convert(row: &Row, i: usize, ty: &Type) -> Result<JsonValue, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => or_null(row.try_get::<_, Option<bool>>(i)?, JsonValue::Bool),
        Type::CHAR => or_null(row.try_get::<_, Option<i8>>(i)?, |v| {
            JsonValue::String(char::from(v as u8).to_string())
        }),
        Type::INT2 => or_null(row.try_get::<_, Option<i16>>(i)?, |v| JsonValue::Number(v.into())),
        Type::INT4 => or_null(row.try_get::<_, Option<i32>>(i)?, |v| JsonValue::Number(v.into())),
        Type::INT8 => or_null(row.try_get::<_, Option<i64>>(i)?, |v| JsonValue::Number(v.into())),
        Type::OID => or_null(row.try_get::<_, Option<u32>>(i)?, |v| JsonValue::Number(v.into())),
        Type::FLOAT4 => or_null(row.try_get::<_, Option<f32>>(i)?, float4),
        Type::FLOAT8 => or_null(row.try_get::<_, Option<f64>>(i)?, float8),
        Type::NUMERIC => or_null(row.try_get::<_, Option<PgNumeric>>(i)?, |v| JsonValue::String(v.0)),
        Type::MONEY => or_null(row.try_get::<_, Option<PgMoney>>(i)?, |v| JsonValue::String(v.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            or_null(row.try_get::<_, Option<String>>(i)?, JsonValue::String)
        }
        Type::JSON | Type::JSONB => row.try_get::<_, Option<JsonValue>>(i)?.unwrap_or(JsonValue::Null),
        Type::UUID => or_null(row.try_get::<_, Option<Uuid>>(i)?, |v| JsonValue::String(v.to_string())),
        Type::DATE => or_null(row.try_get::<_, Option<NaiveDate>>(i)?, date),
        Type::TIME => or_null(row.try_get::<_, Option<NaiveTime>>(i)?, time),
        Type::TIMESTAMP => or_null(row.try_get::<_, Option<NaiveDateTime>>(i)?, timestamp),
        Type::TIMESTAMPTZ => or_null(row.try_get::<_, Option<DateTime<Utc>>>(i)?, timestamptz),
        Type::BYTEA => or_null(row.try_get::<_, Option<Vec<u8>>>(i)?, |v| JsonValue::String(bytea(&v))),

        Type::BOOL_ARRAY => array(row.try_get::<_, Option<Vec<Option<bool>>>>(i)?, JsonValue::Bool),
        Type::INT2_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<i16>>>>(i)?, |v| JsonValue::Number(v.into()))
        }
        Type::INT4_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<i32>>>>(i)?, |v| JsonValue::Number(v.into()))
        }
        Type::INT8_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<i64>>>>(i)?, |v| JsonValue::Number(v.into()))
        }
        Type::FLOAT4_ARRAY => array(row.try_get::<_, Option<Vec<Option<f32>>>>(i)?, float4),
        Type::FLOAT8_ARRAY => array(row.try_get::<_, Option<Vec<Option<f64>>>>(i)?, float8),
        Type::NUMERIC_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<PgNumeric>>>>(i)?, |v| JsonValue::String(v.0))
        }
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<String>>>>(i)?, JsonValue::String)
        }
        Type::JSON_ARRAY | Type::JSONB_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<JsonValue>>>>(i)?, |v| v)
        }
        Type::UUID_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<Uuid>>>>(i)?, |v| JsonValue::String(v.to_string()))
        }
        Type::DATE_ARRAY => array(row.try_get::<_, Option<Vec<Option<NaiveDate>>>>(i)?, date),
        Type::TIMESTAMP_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<NaiveDateTime>>>>(i)?, timestamp)
        }
        Type::TIMESTAMPTZ_ARRAY => {
            array(row.try_get::<_, Option<Vec<Option<DateTime<Utc>>>>>(i)?, timestamptz)
        }

        _ => match ty.kind() {
            Kind::Enum(_) => or_null(row.try_get::<_, Option<PgLabel>>(i)?, |v| JsonValue::String(v.0)),
            Kind::Array(inner) if matches!(inner.kind(), Kind::Enum(_)) => {
                array(row.try_get::<_, Option<Vec<Option<PgLabel>>>>(i)?, |v| JsonValue::String(v.0))
            }
            _ => match row.try_get::<_, Option<Raw>>(i)? {
                Some(_) => unsupported(ty),
                None => JsonValue::Null,
            },
        },
    };
    Ok(value)
}

fn or_null<T>(value: Option<T>, f: impl FnOnce(T) -> JsonValue) -> JsonValue {
    value.map(f).unwrap_or(JsonValue::Null)
}

fn array<T>(value: Option<Vec<Option<T>>>, f: impl Fn(T) -> JsonValue) -> JsonValue {
    value
        .map(|items| {
            JsonValue::Array(items.into_iter().map(|v| v.map(&f).unwrap_or(JsonValue::Null)).collect())
        })
        .unwrap_or(JsonValue::Null)
}

fn unsupported(ty: &Type) -> JsonValue {
    JsonValue::String(format!("<{}>", ty.name()))
}

fn float4(v: f32) -> JsonValue {
    // Go through the shortest decimal form so 0.1f32 stays 0.1.
    let widened = v.to_string().parse::<f64>().unwrap_or(f64::from(v));
    float8(widened)
}

fn float8(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("NaN".to_string()),
        None if v > 0.0 => JsonValue::String("Infinity".to_string()),
        None => JsonValue::String("-Infinity".to_string()),
    }
}

fn date(v: NaiveDate) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%d").to_string())
}

fn time(v: NaiveTime) -> JsonValue {
    JsonValue::String(v.format("%H:%M:%S%.f").to_string())
}

fn timestamp(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn timestamptz(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// PostgreSQL hex output format for bytea.
fn bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// NUMERIC decoded to its exact decimal text.
struct PgNumeric(String);

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, BoxError> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "numeric value is truncated".into())
}

/// Binary layout: ndigits, weight, sign, dscale (all 16-bit), then `ndigits`
/// base-10000 digits. The first digit is worth `10000^weight`.
fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let ndigits = read_u16(raw, 0)? as i16;
    let weight = read_u16(raw, 2)? as i16;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let mut digits = Vec::with_capacity(ndigits.max(0) as usize);
    for n in 0..ndigits.max(0) as usize {
        digits.push(read_u16(raw, 8 + n * 2)?);
    }
    let weight = i32::from(weight);
    let digit_at = |index: i32| -> u16 {
        usize::try_from(index).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            let group = digit_at(index);
            if index == 0 {
                out.push_str(&group.to_string());
            } else {
                out.push_str(&format!("{group:04}"));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    if out == "-0" || (out.starts_with("-0.") && out[3..].bytes().all(|b| b == b'0')) {
        out.remove(0);
    }

    Ok(out)
}

/// MONEY as `$1,234.56`; the server stores it as a count of cents.
struct PgMoney(String);

impl<'a> FromSql<'a> for PgMoney {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let cents = i64::from_sql(&Type::INT8, raw)?;
        Ok(PgMoney(format_money(cents)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::MONEY
    }
}

fn format_money(cents: i64) -> String {
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (n, c) in whole.chars().enumerate() {
        if n > 0 && (whole.len() - n) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", abs % 100)
}

/// Enum label; enums are sent as their label text.
struct PgLabel(String);

impl<'a> FromSql<'a> for PgLabel {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(PgLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// Accepts any type; only used to tell NULL from a value.
struct Raw;

impl<'a> FromSql<'a> for Raw {
    fn from_sql(_: &Type, _: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Raw)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_numeric() {
        // 12345.678
        assert_eq!(decode_numeric(&numeric(1, 0, 3, &[1, 2345, 6780])).unwrap(), "12345.678");
        // -0.05
        assert_eq!(decode_numeric(&numeric(-1, NUMERIC_NEG, 2, &[500])).unwrap(), "-0.05");
        // 0.00001234
        assert_eq!(decode_numeric(&numeric(-2, 0, 8, &[1234])).unwrap(), "0.00001234");
        // 1000000 (trailing zero groups are omitted on the wire)
        assert_eq!(decode_numeric(&numeric(1, 0, 0, &[100])).unwrap(), "1000000");
        // 0 with scale
        assert_eq!(decode_numeric(&numeric(0, 0, 2, &[])).unwrap(), "0.00");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NINF, 0, &[])).unwrap(), "-Infinity");
    }

    #[test]
    fn test_decode_numeric_truncated() {
        assert!(decode_numeric(&[0, 1]).is_err());
        let mut raw = numeric(0, 0, 0, &[7]);
        raw.pop();
        assert!(decode_numeric(&raw).is_err());
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(123456), "$1,234.56");
        assert_eq!(format_money(5), "$0.05");
        assert_eq!(format_money(-100000000), "-$1,000,000.00");
    }

    #[test]
    fn test_scalar_formats() {
        assert_eq!(bytea(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(bytea(&[]), "\\x");
        assert_eq!(float4(0.1), JsonValue::from(0.1));
        assert_eq!(float8(f64::NAN), JsonValue::from("NaN"));
        assert_eq!(float8(f64::NEG_INFINITY), JsonValue::from("-Infinity"));

        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.5+02:00").unwrap();
        assert_eq!(timestamptz(ts.with_timezone(&Utc)), JsonValue::from("2024-05-01T08:00:00.500Z"));
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date(d), JsonValue::from("2024-02-29"));
        assert_eq!(time(NaiveTime::from_hms_opt(7, 5, 0).unwrap()), JsonValue::from("07:05:00"));
    }

    #[test]
    fn test_array_keeps_nulls() {
        let value = array(Some(vec![Some(1i32), None, Some(3)]), |v| JsonValue::Number(v.into()));
        assert_eq!(value, serde_json::json!([1, null, 3]));
        assert_eq!(array::<i32>(None, |v| JsonValue::Number(v.into())), JsonValue::Null);
    }
}
