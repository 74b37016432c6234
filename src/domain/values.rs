//! Lenient scalar types for source record fields
//!
//! The ERP feed is not consistent about scalar encodings: line numbers arrive as
//! integers, floats or strings, and timestamps arrive with or without offsets.
//! These wrappers accept every encoding seen in the feed and serialize to one
//! canonical form so content hashes stay stable.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Integer field accepting JSON integers, integral floats and numeric strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErpInt(pub i64);

impl ErpInt {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ErpInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ErpInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for ErpInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntVisitor;

        impl<'de> Visitor<'de> for IntVisitor {
            type Value = ErpInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer, an integral float or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ErpInt, E> {
                Ok(ErpInt(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ErpInt, E> {
                i64::try_from(v)
                    .map(ErpInt)
                    .map_err(|_| E::custom(format!("integer {v} out of range")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ErpInt, E> {
                integral(v).ok_or_else(|| E::custom(format!("expected an integer, got {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ErpInt, E> {
                let trimmed = v.trim();
                if let Ok(parsed) = trimmed.parse::<i64>() {
                    return Ok(ErpInt(parsed));
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(integral)
                    .ok_or_else(|| E::custom(format!("expected an integer, got \"{v}\"")))
            }
        }

        deserializer.deserialize_any(IntVisitor)
    }
}

fn integral(v: f64) -> Option<ErpInt> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(ErpInt(v as i64))
    } else {
        None
    }
}

/// Decimal quantity field accepting numbers and numeric strings
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ErpDecimal(pub f64);

impl ErpDecimal {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Serialize for ErpDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for ErpDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DecimalVisitor;

        impl<'de> Visitor<'de> for DecimalVisitor {
            type Value = ErpDecimal;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ErpDecimal, E> {
                Ok(ErpDecimal(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ErpDecimal, E> {
                Ok(ErpDecimal(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ErpDecimal, E> {
                Ok(ErpDecimal(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ErpDecimal, E> {
                v.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|parsed| parsed.is_finite())
                    .map(ErpDecimal)
                    .ok_or_else(|| E::custom(format!("expected a number, got \"{v}\"")))
            }
        }

        deserializer.deserialize_any(DecimalVisitor)
    }
}

/// Timestamp field normalized to UTC
///
/// Offset-free values are read as UTC. Output is always RFC 3339 with a `Z`
/// suffix.
///
/// # Examples
///
/// ```
/// use erp_sync::domain::values::ErpTimestamp;
///
/// let ts: ErpTimestamp = serde_json::from_str("\"2024-03-01 08:30:00\"").unwrap();
/// assert_eq!(serde_json::to_string(&ts).unwrap(), "\"2024-03-01T08:30:00Z\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErpTimestamp(pub DateTime<Utc>);

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

impl ErpTimestamp {
    /// Parses any of the accepted timestamp encodings
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Some(Self(dt.with_timezone(&Utc)));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return Some(Self(naive.and_utc()));
            }
        }

        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Self(naive.and_utc()))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Serialize for ErpTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl<'de> Deserialize<'de> for ErpTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ErpTimestamp::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp \"{raw}\"")))
    }
}
