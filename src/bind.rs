//! Bind values and their conversion into driver-safe scalars.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::borrow::Cow;
use std::collections::BTreeMap;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A named parameter value as supplied by application code.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
    /// Expanded into one placeholder per element by drivers that support it.
    List(Vec<BindValue>),
}

/// A value in the form handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ScalarValue>),
}

/// Named bind values before conversion.
pub type Params = BTreeMap<String, BindValue>;

/// Named bind values after conversion.
pub type ScalarParams = BTreeMap<String, ScalarValue>;

impl ScalarValue {
    /// Renders the value as an SQL literal for debug output.
    ///
    /// Text is single-quoted with embedded quotes doubled. The result is meant
    /// for humans, not for execution.
    pub fn to_literal(&self) -> String {
        match self {
            ScalarValue::Null => "null".to_string(),
            ScalarValue::Int(value) => value.to_string(),
            ScalarValue::Float(value) => value.to_string(),
            ScalarValue::Text(value) => format!("'{}'", value.replace('\'', "''")),
            ScalarValue::List(items) => items
                .iter()
                .map(ScalarValue::to_literal)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BindValue {
                fn from(value: $ty) -> Self {
                    BindValue::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Bool(value)
    }
}

impl From<f32> for BindValue {
    fn from(value: f32) -> Self {
        BindValue::Float(f64::from(value))
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for BindValue {
    fn from(value: DateTime<Tz>) -> Self {
        BindValue::Timestamp(value.fixed_offset())
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BindValue::Null, Into::into)
    }
}

impl<T: Into<BindValue>> From<Vec<T>> for BindValue {
    fn from(values: Vec<T>) -> Self {
        BindValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Builds a [`Params`] map from `name => value` pairs.
///
/// ```
/// use sqlx_resilient::{params, BindValue};
///
/// let values = params! { "id" => 7, "name" => "Alice", "active" => true };
/// assert_eq!(values["id"], BindValue::Int(7));
/// assert_eq!(values.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $(
            params.insert(::std::string::String::from($name), $crate::BindValue::from($value));
        )+
        params
    }};
}

/// The query-builder side: SQL text plus its named values.
///
/// Implement this for query objects so they can be handed to
/// [`ResilientExecutor::perform_query`](crate::ResilientExecutor::perform_query).
pub trait BindSource {
    fn statement(&self) -> Cow<'_, str>;

    fn bind_values(&self) -> &Params;

    /// Values for multi-row statements, applied after [`bind_values`](Self::bind_values).
    fn bulk_bind_values(&self) -> Option<&Params> {
        None
    }
}

/// Converts [`BindValue`]s into [`ScalarValue`]s.
#[derive(Debug, Clone, Copy)]
pub struct BindValueConverter {
    normalize_to_utc: bool,
}

impl Default for BindValueConverter {
    fn default() -> Self {
        Self {
            normalize_to_utc: true,
        }
    }
}

impl BindValueConverter {
    pub fn new(normalize_to_utc: bool) -> Self {
        Self { normalize_to_utc }
    }

    /// Converts a single value.
    ///
    /// Timestamps become `YYYY-MM-DD HH:MM:SS` text (shifted to UTC first when
    /// normalizing) and booleans become `1`/`0`.
    ///
    /// ```
    /// use chrono::DateTime;
    /// use sqlx_resilient::{BindValue, BindValueConverter, ScalarValue};
    ///
    /// let at = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+02:00").unwrap();
    /// let converter = BindValueConverter::default();
    /// assert_eq!(
    ///     converter.convert(&BindValue::from(at)),
    ///     ScalarValue::Text("2024-03-01 07:30:00".to_string())
    /// );
    /// assert_eq!(converter.convert(&BindValue::Bool(true)), ScalarValue::Int(1));
    /// ```
    pub fn convert(&self, value: &BindValue) -> ScalarValue {
        match value {
            BindValue::Null => ScalarValue::Null,
            BindValue::Bool(flag) => ScalarValue::Int(i64::from(*flag)),
            BindValue::Int(value) => ScalarValue::Int(*value),
            BindValue::Float(value) => ScalarValue::Float(*value),
            BindValue::Text(value) => ScalarValue::Text(value.clone()),
            BindValue::Timestamp(at) => ScalarValue::Text(self.format_timestamp(at)),
            BindValue::List(items) => {
                ScalarValue::List(items.iter().map(|item| self.convert(item)).collect())
            }
        }
    }

    /// Converts single-row values and then bulk values into one map.
    ///
    /// A bulk value replaces a single-row value of the same name.
    pub fn convert_all(&self, single: &Params, bulk: Option<&Params>) -> ScalarParams {
        let mut converted = ScalarParams::new();
        for (name, value) in single.iter().chain(bulk.into_iter().flatten()) {
            converted.insert(name.clone(), self.convert(value));
        }
        converted
    }

    fn format_timestamp(&self, at: &DateTime<FixedOffset>) -> String {
        if self.normalize_to_utc {
            at.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string()
        } else {
            at.format(TIMESTAMP_FORMAT).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokyo_noon() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2023-12-31T12:00:05+09:00").unwrap()
    }

    #[test]
    fn timestamps_are_normalized_to_utc_by_default() {
        let at = tokyo_noon();
        let converted = BindValueConverter::default().convert(&BindValue::Timestamp(at));

        assert_eq!(converted, ScalarValue::Text("2023-12-31 03:00:05".to_string()));
        assert_eq!(at.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn timestamps_keep_their_offset_when_not_normalizing() {
        let converted = BindValueConverter::new(false).convert(&BindValue::Timestamp(tokyo_noon()));
        assert_eq!(converted, ScalarValue::Text("2023-12-31 12:00:05".to_string()));
    }

    #[test]
    fn utc_conversion_can_cross_a_date_boundary() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T01:15:00+05:30").unwrap();
        let converted = BindValueConverter::default().convert(&at.into());
        assert_eq!(converted, ScalarValue::Text("2023-12-31 19:45:00".to_string()));
    }

    #[test]
    fn booleans_become_integers() {
        let converter = BindValueConverter::default();
        assert_eq!(converter.convert(&true.into()), ScalarValue::Int(1));
        assert_eq!(converter.convert(&false.into()), ScalarValue::Int(0));
    }

    #[test]
    fn other_values_pass_through() {
        let converter = BindValueConverter::default();
        assert_eq!(converter.convert(&BindValue::Null), ScalarValue::Null);
        assert_eq!(converter.convert(&42.into()), ScalarValue::Int(42));
        assert_eq!(converter.convert(&1.5.into()), ScalarValue::Float(1.5));
        assert_eq!(converter.convert(&"qux".into()), ScalarValue::Text("qux".to_string()));
        assert_eq!(
            converter.convert(&vec![true, false].into()),
            ScalarValue::List(vec![ScalarValue::Int(1), ScalarValue::Int(0)])
        );
    }

    #[test]
    fn bulk_values_override_single_values() {
        let single = params! { "id" => 1, "name" => "single" };
        let bulk = params! { "name" => "bulk", "flag" => true };

        let converted = BindValueConverter::default().convert_all(&single, Some(&bulk));

        assert_eq!(converted.len(), 3);
        assert_eq!(converted["id"], ScalarValue::Int(1));
        assert_eq!(converted["name"], ScalarValue::Text("bulk".to_string()));
        assert_eq!(converted["flag"], ScalarValue::Int(1));
    }

    #[test]
    fn literals_for_debug_output() {
        assert_eq!(ScalarValue::Null.to_literal(), "null");
        assert_eq!(ScalarValue::Int(-3).to_literal(), "-3");
        assert_eq!(ScalarValue::Text("O'Brien".to_string()).to_literal(), "'O''Brien'");
        assert_eq!(
            ScalarValue::List(vec![ScalarValue::Int(1), ScalarValue::Text("a".to_string())]).to_literal(),
            "1, 'a'"
        );
    }

    #[test]
    fn optional_values_map_to_null() {
        let missing: Option<i32> = None;
        assert_eq!(BindValue::from(missing), BindValue::Null);
        assert_eq!(BindValue::from(Some("x")), BindValue::Text("x".to_string()));
    }
}
