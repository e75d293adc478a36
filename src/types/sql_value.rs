use serde::ser::{Serialize, Serializer};

/// A SQL value in a driver-agnostic form.
///
/// Used both for query parameters and for the cells of a fetched row.
/// Drivers are responsible for converting these to and from their native types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
}

/// How a parameter is encoded when bound to a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Integer,
    Binary,
    Double,
    Text,
}

impl BindType {
    /// Picks the bind type for a parameter. Null binds as text.
    pub fn of(value: &SqlValue) -> Self {
        match value {
            SqlValue::Integer(_) => BindType::Integer,
            SqlValue::Binary(_) => BindType::Binary,
            SqlValue::Float(_) => BindType::Double,
            SqlValue::Text(_) | SqlValue::Null => BindType::Text,
        }
    }
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Hex form used wherever binary data has to travel as text.
    pub(crate) fn hex_literal(bytes: &[u8]) -> String {
        format!("\\x{}", hex::encode(bytes))
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_unit(),
            SqlValue::Integer(i) => serializer.serialize_i64(*i),
            SqlValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            SqlValue::Float(_) => serializer.serialize_unit(),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::Binary(b) => serializer.serialize_str(&SqlValue::hex_literal(b)),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

macro_rules! integer_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for SqlValue {
                fn from(value: $t) -> Self {
                    SqlValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

integer_from!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float(f64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Binary(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        SqlValue::Binary(value.to_vec())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Builds a `&[SqlValue]` from a list of convertible expressions.
///
/// ```
/// use pgexec::{params, SqlValue};
///
/// fn count(args: &[SqlValue]) -> usize {
///     args.len()
/// }
///
/// assert_eq!(count(params![1, "two", 3.5, None::<i32>]), 4);
/// assert_eq!(count(params![]), 0);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[] as &[$crate::SqlValue]
    };
    ($($value:expr),+ $(,)?) => {
        &[$($crate::SqlValue::from($value)),+] as &[$crate::SqlValue]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_type_inference() {
        assert_eq!(BindType::of(&SqlValue::from(true)), BindType::Integer);
        assert_eq!(BindType::of(&SqlValue::from(7_i32)), BindType::Integer);
        assert_eq!(BindType::of(&SqlValue::from(vec![1_u8, 2])), BindType::Binary);
        assert_eq!(BindType::of(&SqlValue::from(1.5)), BindType::Double);
        assert_eq!(BindType::of(&SqlValue::from("x")), BindType::Text);
        assert_eq!(BindType::of(&SqlValue::Null), BindType::Text);
    }

    #[test]
    fn test_bool_coerces_to_integer() {
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(false), SqlValue::Integer(0));
    }

    #[test]
    fn test_option_none_is_null() {
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3_i64)), SqlValue::Integer(3));
    }

    #[test]
    fn test_json_serialization() {
        let values = vec![
            SqlValue::Null,
            SqlValue::Integer(4),
            SqlValue::Float(2.5),
            SqlValue::Float(f64::NAN),
            SqlValue::Text("a\"b".to_string()),
            SqlValue::Binary(vec![0xde, 0xad]),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,4,2.5,null,"a\"b","\\xdead"]"#);
    }
}
