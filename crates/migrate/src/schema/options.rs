//! Option maps for schema objects
//!
//! Columns, indexes and foreign keys accept loosely typed option maps. Each
//! object declares a fixed dispatch table of `(key, setter)` pairs; unknown
//! keys are rejected before anything is mutated, and setters run against a
//! staged copy so a failing value leaves the target untouched.

use serde_json::Value as JsonValue;

use crate::error::{MigrationError, MigrationResult};

/// A single option value
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Loose truthiness: `false`, `0`, `""`, `"0"`, null and empty lists are false
    pub fn is_truthy(&self) -> bool {
        match self {
            OptionValue::Null => false,
            OptionValue::Bool(b) => *b,
            OptionValue::Int(i) => *i != 0,
            OptionValue::Float(f) => *f != 0.0,
            OptionValue::Str(s) => !s.is_empty() && s != "0",
            OptionValue::List(items) => !items.is_empty(),
        }
    }

    pub fn as_bool(&self, key: &str) -> MigrationResult<bool> {
        match self {
            OptionValue::Bool(b) => Ok(*b),
            OptionValue::Int(0) => Ok(false),
            OptionValue::Int(1) => Ok(true),
            _ => Err(invalid_value(key, "a boolean", self)),
        }
    }

    pub fn as_u32(&self, key: &str) -> MigrationResult<u32> {
        match self {
            OptionValue::Int(i) if *i >= 0 && *i <= u32::MAX as i64 => Ok(*i as u32),
            OptionValue::Str(s) => s
                .parse::<u32>()
                .map_err(|_| invalid_value(key, "a non-negative integer", self)),
            _ => Err(invalid_value(key, "a non-negative integer", self)),
        }
    }

    pub fn as_string(&self, key: &str) -> MigrationResult<String> {
        match self {
            OptionValue::Str(s) => Ok(s.clone()),
            _ => Err(invalid_value(key, "a string", self)),
        }
    }

    /// `None` for null, otherwise the string value
    pub fn as_optional_string(&self, key: &str) -> MigrationResult<Option<String>> {
        match self {
            OptionValue::Null => Ok(None),
            other => other.as_string(key).map(Some),
        }
    }

    pub fn as_list(&self, key: &str) -> MigrationResult<Vec<String>> {
        match self {
            OptionValue::List(items) => Ok(items.clone()),
            OptionValue::Str(s) => Ok(vec![s.clone()]),
            _ => Err(invalid_value(key, "a list of strings", self)),
        }
    }
}

fn invalid_value(key: &str, expected: &str, got: &OptionValue) -> MigrationError {
    MigrationError::Validation(format!(
        "option \"{}\" expects {}, got {:?}",
        key, expected, got
    ))
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value as i64)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Int(value as i64)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(value: Vec<&str>) -> Self {
        OptionValue::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::List(value)
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => OptionValue::Null,
        }
    }
}

impl TryFrom<JsonValue> for OptionValue {
    type Error = MigrationError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Null => Ok(OptionValue::Null),
            JsonValue::Bool(b) => Ok(OptionValue::Bool(b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(OptionValue::Int(i)),
                None => Ok(OptionValue::Float(n.as_f64().unwrap_or_default())),
            },
            JsonValue::String(s) => Ok(OptionValue::Str(s)),
            JsonValue::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(s) => Ok(s),
                    other => Err(MigrationError::Validation(format!(
                        "option lists may only contain strings, got {}",
                        other
                    ))),
                })
                .collect::<MigrationResult<Vec<_>>>()
                .map(OptionValue::List),
            JsonValue::Object(_) => Err(MigrationError::Validation(
                "nested objects are not valid option values".to_string(),
            )),
        }
    }
}

/// Convert a JSON object into an ordered option list
pub fn options_from_json(value: JsonValue) -> MigrationResult<Vec<(String, OptionValue)>> {
    match value {
        JsonValue::Object(map) => map
            .into_iter()
            .map(|(key, value)| Ok((key, OptionValue::try_from(value)?)))
            .collect(),
        other => Err(MigrationError::Validation(format!(
            "options must be a JSON object, got {}",
            other
        ))),
    }
}

/// Typed setter used in option dispatch tables
pub type OptionSetter<T> = fn(&mut T, OptionValue) -> MigrationResult<()>;

/// Apply an option map through a dispatch table.
///
/// All keys are checked first; setters then run on a clone which replaces
/// `target` only when every setter succeeded.
pub(crate) fn apply_options<T, K, V, I>(
    target: &mut T,
    kind: &str,
    table: &[(&str, OptionSetter<T>)],
    options: I,
) -> MigrationResult<()>
where
    T: Clone,
    K: AsRef<str>,
    V: Into<OptionValue>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut resolved = Vec::new();
    for (key, value) in options {
        let key = key.as_ref();
        let setter = table
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, setter)| *setter)
            .ok_or_else(|| {
                MigrationError::Validation(format!("\"{}\" is not a valid {} option.", key, kind))
            })?;
        resolved.push((setter, value.into()));
    }

    let mut staged = target.clone();
    for (setter, value) in resolved {
        setter(&mut staged, value)?;
    }
    *target = staged;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(OptionValue::from(true).is_truthy());
        assert!(OptionValue::from(1).is_truthy());
        assert!(OptionValue::from("yes").is_truthy());
        assert!(!OptionValue::from(false).is_truthy());
        assert!(!OptionValue::from(0).is_truthy());
        assert!(!OptionValue::from("0").is_truthy());
        assert!(!OptionValue::Null.is_truthy());
    }

    #[test]
    fn test_options_from_json_preserves_values() {
        let options = options_from_json(json!({"limit": 20, "name": "idx", "cols": ["a", "b"]})).unwrap();
        assert!(options.contains(&("limit".to_string(), OptionValue::Int(20))));
        assert!(options.contains(&("name".to_string(), OptionValue::Str("idx".to_string()))));
        assert!(options.contains(&(
            "cols".to_string(),
            OptionValue::List(vec!["a".to_string(), "b".to_string()])
        )));
        assert!(options_from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(OptionValue::from("12").as_u32("limit").unwrap(), 12);
        assert!(OptionValue::from(-1).as_u32("limit").is_err());
        assert!(OptionValue::from(true).as_u32("limit").is_err());
    }
}
