// 🏷️ Column Type Model - scalar/list tagging, conversion table, coercion
// Every attribute column holds one of five plain kinds, either as a single
// value or as a list of values.

use crate::error::CoercionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PLAIN TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlainType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
}

impl PlainType {
    pub const ALL: [PlainType; 5] = [
        PlainType::String,
        PlainType::Integer,
        PlainType::Long,
        PlainType::Double,
        PlainType::Boolean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlainType::String => "String",
            PlainType::Integer => "Integer",
            PlainType::Long => "Long",
            PlainType::Double => "Double",
            PlainType::Boolean => "Boolean",
        }
    }

    /// Whether values of `self` may be folded into a column of `to`.
    pub fn can_convert_to(self, to: PlainType) -> bool {
        use PlainType::*;
        match (self, to) {
            (_, String) => true,
            (Integer, Integer | Long | Double) => true,
            (Long, Long | Double) => true,
            (Double, Double) => true,
            (Boolean, Boolean) => true,
            _ => false,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, PlainType::Integer | PlainType::Long | PlainType::Double)
    }
}

// ============================================================================
// COLUMN TYPE
// ============================================================================

/// Type of an attribute column: a plain kind, optionally wrapped in a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    Scalar(PlainType),
    List(PlainType),
}

impl ColumnType {
    pub const STRING: ColumnType = ColumnType::Scalar(PlainType::String);
    pub const INTEGER: ColumnType = ColumnType::Scalar(PlainType::Integer);

    pub fn is_list(&self) -> bool {
        matches!(self, ColumnType::List(_))
    }

    /// Strip the list tag.
    pub fn plain(&self) -> PlainType {
        match self {
            ColumnType::Scalar(p) | ColumnType::List(p) => *p,
        }
    }

    pub fn to_list(&self) -> ColumnType {
        ColumnType::List(self.plain())
    }

    /// Conversion table used to validate attribute mappings.
    ///
    /// A list never folds into a scalar; a scalar folds into a list of any
    /// type its plain kind converts to.
    pub fn can_convert_to(&self, to: ColumnType) -> bool {
        match (self, to) {
            (ColumnType::List(_), ColumnType::Scalar(_)) => false,
            (from, to) => from.plain().can_convert_to(to.plain()),
        }
    }

    /// Every type this one can be merged into, scalars first.
    pub fn convertible_types(&self) -> Vec<ColumnType> {
        let mut types: Vec<ColumnType> = PlainType::ALL
            .iter()
            .map(|p| ColumnType::Scalar(*p))
            .chain(PlainType::ALL.iter().map(|p| ColumnType::List(*p)))
            .filter(|t| self.can_convert_to(*t))
            .collect();
        types.sort();
        types
    }

    /// The narrowest type every one of `types` can be merged into.
    pub fn compatible_type<I>(types: I) -> ColumnType
    where
        I: IntoIterator<Item = ColumnType>,
    {
        let types: Vec<ColumnType> = types.into_iter().collect();
        let Some(first) = types.first().copied() else {
            return ColumnType::STRING;
        };
        if types.iter().all(|t| *t == first) {
            return first;
        }

        let any_list = types.iter().any(|t| t.is_list());
        let mut plains: Vec<PlainType> = types.iter().map(|t| t.plain()).collect();
        plains.sort();
        plains.dedup();

        let plain = if plains.len() == 1 {
            plains[0]
        } else if plains.iter().all(|p| p.is_numeric()) {
            if plains.contains(&PlainType::Double) {
                PlainType::Double
            } else {
                PlainType::Long
            }
        } else {
            PlainType::String
        };

        if any_list {
            ColumnType::List(plain)
        } else {
            ColumnType::Scalar(plain)
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(p) => write!(f, "{}", p.as_str()),
            ColumnType::List(p) => write!(f, "List<{}>", p.as_str()),
        }
    }
}

impl FromStr for PlainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(PlainType::String),
            "integer" | "int" => Ok(PlainType::Integer),
            "long" => Ok(PlainType::Long),
            "double" | "float" => Ok(PlainType::Double),
            "boolean" | "bool" => Ok(PlainType::Boolean),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("list<") && lower.ends_with('>') {
            let inner = &s[5..s.len() - 1];
            return Ok(ColumnType::List(inner.parse()?));
        }
        Ok(ColumnType::Scalar(s.parse()?))
    }
}

// Serialized as its display form so job files can say "List<String>".
impl Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// A single non-null attribute value.
///
/// Equality is exact. `Double` compares bit patterns: no epsilon, NaN
/// equals NaN, and `0.0` differs from `-0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn plain_type(&self) -> PlainType {
        match self {
            Value::String(_) => PlainType::String,
            Value::Integer(_) => PlainType::Integer,
            Value::Long(_) => PlainType::Long,
            Value::Double(_) => PlainType::Double,
            Value::Boolean(_) => PlainType::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            Value::Boolean(_) => None,
        }
    }

    /// Convert to `to`, parsing text where needed.
    pub fn coerce(self, to: PlainType) -> Result<Value, CoercionError> {
        if self.plain_type() == to {
            return Ok(self);
        }
        let fail = |v: &Value| CoercionError {
            value: v.to_string(),
            target: ColumnType::Scalar(to),
        };

        match (&self, to) {
            (_, PlainType::String) => Ok(Value::String(self.to_string())),

            (Value::Integer(v), PlainType::Long) => Ok(Value::Long(i64::from(*v))),
            (Value::Integer(v), PlainType::Double) => Ok(Value::Double(f64::from(*v))),
            (Value::Long(v), PlainType::Integer) => {
                i32::try_from(*v).map(Value::Integer).map_err(|_| fail(&self))
            }
            (Value::Long(v), PlainType::Double) => Ok(Value::Double(*v as f64)),
            (Value::Double(v), PlainType::Integer) => whole(*v)
                .and_then(|w| i32::try_from(w).ok())
                .map(Value::Integer)
                .ok_or_else(|| fail(&self)),
            (Value::Double(v), PlainType::Long) => {
                whole(*v).map(Value::Long).ok_or_else(|| fail(&self))
            }

            (Value::String(s), PlainType::Integer) => {
                s.trim().parse().map(Value::Integer).map_err(|_| fail(&self))
            }
            (Value::String(s), PlainType::Long) => {
                s.trim().parse().map(Value::Long).map_err(|_| fail(&self))
            }
            (Value::String(s), PlainType::Double) => {
                s.trim().parse().map(Value::Double).map_err(|_| fail(&self))
            }
            (Value::String(s), PlainType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(fail(&self)),
            },

            _ => Err(fail(&self)),
        }
    }

    /// Parse text as a value of `ty`; used by the CSV reader.
    pub fn parse(text: &str, ty: PlainType) -> Result<Value, CoercionError> {
        Value::String(text.to_string()).coerce(ty)
    }
}

fn whole(v: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

// ============================================================================
// CELLS
// ============================================================================

/// Content of one table cell. An absent cell (null) is modelled as `None`
/// by the stores; lists never contain nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    List(Vec<Value>),
    Scalar(Value),
}

impl Cell {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Cell::Scalar(value.into())
    }

    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Cell::List(values.into_iter().map(Into::into).collect())
    }

    /// Whether this cell can be stored in a column of `ty` as-is.
    pub fn fits(&self, ty: ColumnType) -> bool {
        match (self, ty) {
            (Cell::Scalar(v), ColumnType::Scalar(p)) => v.plain_type() == p,
            (Cell::List(vs), ColumnType::List(p)) => vs.iter().all(|v| v.plain_type() == p),
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Cell::Scalar(v) => Some(v),
            Cell::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Cell::List(vs) => Some(vs),
            Cell::Scalar(_) => None,
        }
    }

    /// Values held by the cell: one for a scalar, all elements for a list.
    pub fn values(&self) -> &[Value] {
        match self {
            Cell::Scalar(v) => std::slice::from_ref(v),
            Cell::List(vs) => vs,
        }
    }

    /// Convert to a single value of `to`. Lists do not fold into scalars.
    pub fn to_scalar(&self, to: PlainType) -> Result<Value, CoercionError> {
        match self {
            Cell::Scalar(v) => v.clone().coerce(to),
            Cell::List(_) => Err(CoercionError {
                value: self.to_string(),
                target: ColumnType::Scalar(to),
            }),
        }
    }

    /// Convert every value to `to`. Fails as a whole if any element fails.
    pub fn to_elements(&self, to: PlainType) -> Result<Vec<Value>, CoercionError> {
        self.values().iter().cloned().map(|v| v.coerce(to)).collect()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Scalar(v) => write!(f, "{}", v),
            Cell::List(vs) => {
                let parts: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
