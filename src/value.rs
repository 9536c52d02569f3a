//! Element types and typed columns.
//!
//! A variable holds one element per member of its entity population. Columns
//! are stored as an [`Array`] of a single element type; scalar defaults and
//! single elements are represented by [`Value`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Int,
    Bool,
    /// Enumerations are stored as integer codes.
    Enum,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Enum => "enum",
        })
    }
}

/// A single element value.
///
/// # Examples
///
/// ```
/// use legiscalc::Value;
///
/// assert_eq!(Value::from(true).as_f64(), 1.0);
/// assert_eq!(Value::from(3).as_i64(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Value {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(v) => f64::from(u8::from(v)),
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Bool(v) => i64::from(v),
            Self::Int(v) => v,
            Self::Float(v) => v as i64,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(v) => v,
            Self::Int(v) => v != 0,
            Self::Float(v) => v != 0.0,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A typed column of values, one per member of an entity population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Array {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
}

impl Array {
    /// An array of `len` copies of `default`, stored as `value_type`.
    #[must_use]
    pub fn filled(value_type: ValueType, default: Value, len: usize) -> Self {
        match value_type {
            ValueType::Float => Self::Float(vec![default.as_f64(); len]),
            ValueType::Int | ValueType::Enum => Self::Int(vec![default.as_i64(); len]),
            ValueType::Bool => Self::Bool(vec![default.as_bool(); len]),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Element at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Self::Float(v) => v.get(index).copied().map(Value::Float),
            Self::Int(v) => v.get(index).copied().map(Value::Int),
            Self::Bool(v) => v.get(index).copied().map(Value::Bool),
        }
    }

    /// Widens every element to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_floats(&self) -> Vec<f64> {
        match self {
            Self::Float(v) => v.clone(),
            Self::Int(v) => v.iter().map(|&x| x as f64).collect(),
            Self::Bool(v) => v.iter().map(|&x| f64::from(u8::from(x))).collect(),
        }
    }

    /// Indices of not-a-number elements.
    #[must_use]
    pub fn nan_indices(&self) -> Vec<usize> {
        match self {
            Self::Float(v) => v
                .iter()
                .enumerate()
                .filter(|(_, x)| x.is_nan())
                .map(|(i, _)| i)
                .collect(),
            Self::Int(_) | Self::Bool(_) => Vec::new(),
        }
    }

    /// Returns true if at least one element differs from `default`.
    #[must_use]
    pub fn differs_from(&self, default: Value) -> bool {
        match self {
            Self::Float(v) => {
                let d = default.as_f64();
                v.iter().any(|&x| x != d)
            }
            Self::Int(v) => {
                let d = default.as_i64();
                v.iter().any(|&x| x != d)
            }
            Self::Bool(v) => {
                let d = default.as_bool();
                v.iter().any(|&x| x != d)
            }
        }
    }

    /// Converts the array to `value_type`.
    ///
    /// Floats are truncated toward zero when cast to integers; non-finite
    /// floats cannot be cast to an integer type.
    ///
    /// # Errors
    ///
    /// Returns the source type name when the conversion is impossible.
    #[allow(clippy::cast_possible_truncation)]
    pub fn cast(self, value_type: ValueType) -> Result<Self, String> {
        match (self, value_type) {
            (a @ Self::Float(_), ValueType::Float)
            | (a @ Self::Int(_), ValueType::Int | ValueType::Enum)
            | (a @ Self::Bool(_), ValueType::Bool) => Ok(a),
            (a @ Self::Int(_), ValueType::Float) | (a @ Self::Bool(_), ValueType::Float) => {
                Ok(Self::Float(a.to_floats()))
            }
            (Self::Float(v), ValueType::Int | ValueType::Enum) => {
                if v.iter().any(|x| !x.is_finite()) {
                    return Err("non-finite float".to_string());
                }
                Ok(Self::Int(v.into_iter().map(|x| x as i64).collect()))
            }
            (Self::Bool(v), ValueType::Int | ValueType::Enum) => {
                Ok(Self::Int(v.into_iter().map(i64::from).collect()))
            }
            (Self::Float(v), ValueType::Bool) => Ok(Self::Bool(v.into_iter().map(|x| x != 0.0).collect())),
            (Self::Int(v), ValueType::Bool) => Ok(Self::Bool(v.into_iter().map(|x| x != 0).collect())),
        }
    }
}

impl From<Vec<f64>> for Array {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<i64>> for Array {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<bool>> for Array {
    fn from(v: Vec<bool>) -> Self {
        Self::Bool(v)
    }
}

/// Shortened rendering used in log lines: at most the first ten elements.
impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 10;
        f.write_str("[")?;
        for i in 0..self.len().min(SHOWN) {
            if i > 0 {
                f.write_str(", ")?;
            }
            if let Some(value) = self.get(i) {
                write!(f, "{value}")?;
            }
        }
        if self.len() > SHOWN {
            write!(f, ", ... ({} total)", self.len())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_casts_default() {
        assert_eq!(Array::filled(ValueType::Float, Value::Int(2), 3), Array::Float(vec![2.0; 3]));
        assert_eq!(Array::filled(ValueType::Enum, Value::Int(1), 2), Array::Int(vec![1, 1]));
        assert_eq!(Array::filled(ValueType::Bool, Value::Float(0.0), 1), Array::Bool(vec![false]));
    }

    #[test]
    fn test_nan_indices() {
        let a = Array::Float(vec![1.0, f64::NAN, 3.0, f64::NAN]);
        assert_eq!(a.nan_indices(), vec![1, 3]);
        assert!(Array::Int(vec![1]).nan_indices().is_empty());
    }

    #[test]
    fn test_cast() {
        let a = Array::Float(vec![1.7, -2.2]).cast(ValueType::Int).unwrap();
        assert_eq!(a, Array::Int(vec![1, -2]));
        let b = Array::Bool(vec![true, false]).cast(ValueType::Float).unwrap();
        assert_eq!(b, Array::Float(vec![1.0, 0.0]));
        let c = Array::Int(vec![0, 5]).cast(ValueType::Bool).unwrap();
        assert_eq!(c, Array::Bool(vec![false, true]));
        assert!(Array::Float(vec![f64::INFINITY]).cast(ValueType::Int).is_err());
    }

    #[test]
    fn test_differs_from_default() {
        assert!(!Array::Float(vec![0.0, 0.0]).differs_from(Value::Float(0.0)));
        assert!(Array::Float(vec![0.0, 1.0]).differs_from(Value::Float(0.0)));
        assert!(!Array::Bool(vec![true]).differs_from(Value::Bool(true)));
    }

    #[test]
    fn test_display_truncates() {
        let a = Array::Int((0..12).collect());
        let text = a.to_string();
        assert!(text.starts_with("[0, 1, 2"));
        assert!(text.contains("(12 total)"));
    }

    #[test]
    fn test_value_serialization() {
        let json = serde_json::to_string(&Value::Float(1.5)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Float(1.5));
    }
}
