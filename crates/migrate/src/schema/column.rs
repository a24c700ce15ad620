//! Column definitions

use std::fmt;

use super::options::{apply_options, OptionSetter, OptionValue};
use crate::error::{MigrationError, MigrationResult};

/// Abstract column types, mapped to concrete types by each dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Char,
    Text,
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Double,
    Decimal,
    Boolean,
    Date,
    Time,
    DateTime,
    Timestamp,
    Binary,
    Json,
    Uuid,
    Enum,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Char => "char",
            ColumnType::Text => "text",
            ColumnType::SmallInteger => "smallinteger",
            ColumnType::Integer => "integer",
            ColumnType::BigInteger => "biginteger",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::DateTime => "datetime",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Binary => "binary",
            ColumnType::Json => "json",
            ColumnType::Uuid => "uuid",
            ColumnType::Enum => "enum",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInteger | ColumnType::Integer | ColumnType::BigInteger
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ColumnType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let column_type = match s.to_lowercase().as_str() {
            "string" => ColumnType::String,
            "char" => ColumnType::Char,
            "text" => ColumnType::Text,
            "smallinteger" => ColumnType::SmallInteger,
            "integer" => ColumnType::Integer,
            "biginteger" => ColumnType::BigInteger,
            "float" => ColumnType::Float,
            "double" => ColumnType::Double,
            "decimal" => ColumnType::Decimal,
            "boolean" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" => ColumnType::DateTime,
            "timestamp" => ColumnType::Timestamp,
            "binary" => ColumnType::Binary,
            "json" => ColumnType::Json,
            "uuid" => ColumnType::Uuid,
            "enum" => ColumnType::Enum,
            other => {
                return Err(MigrationError::Validation(format!(
                    "unknown column type '{}'",
                    other
                )))
            }
        };
        Ok(column_type)
    }
}

/// Column default value
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    CurrentTimestamp,
    /// Raw SQL expression, emitted verbatim
    Expression(String),
}

impl From<OptionValue> for ColumnDefault {
    fn from(value: OptionValue) -> Self {
        match value {
            OptionValue::Null => ColumnDefault::Null,
            OptionValue::Bool(b) => ColumnDefault::Bool(b),
            OptionValue::Int(i) => ColumnDefault::Integer(i),
            OptionValue::Float(f) => ColumnDefault::Float(f),
            OptionValue::Str(s) if s.eq_ignore_ascii_case("CURRENT_TIMESTAMP") => {
                ColumnDefault::CurrentTimestamp
            }
            OptionValue::Str(s) => ColumnDefault::String(s),
            OptionValue::List(items) => ColumnDefault::String(items.join(",")),
        }
    }
}

/// Column options
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOptions {
    pub limit: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub null: bool,
    pub default: Option<ColumnDefault>,
    pub signed: bool,
    pub identity: bool,
    pub after: Option<String>,
    pub comment: Option<String>,
    /// Allowed values for enum columns
    pub values: Vec<String>,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            limit: None,
            precision: None,
            scale: None,
            null: false,
            default: None,
            signed: true,
            identity: false,
            after: None,
            comment: None,
            values: Vec::new(),
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub options: ColumnOptions,
}

const COLUMN_OPTIONS: &[(&str, OptionSetter<Column>)] = &[
    ("limit", |c, v| {
        c.options.limit = Some(v.as_u32("limit")?);
        Ok(())
    }),
    ("length", |c, v| {
        c.options.limit = Some(v.as_u32("length")?);
        Ok(())
    }),
    ("precision", |c, v| {
        c.options.precision = Some(v.as_u32("precision")?);
        Ok(())
    }),
    ("scale", |c, v| {
        c.options.scale = Some(v.as_u32("scale")?);
        Ok(())
    }),
    ("null", |c, v| {
        c.options.null = v.as_bool("null")?;
        Ok(())
    }),
    ("default", |c, v| {
        c.options.default = Some(ColumnDefault::from(v));
        Ok(())
    }),
    ("signed", |c, v| {
        c.options.signed = v.as_bool("signed")?;
        Ok(())
    }),
    ("identity", |c, v| {
        c.options.identity = v.as_bool("identity")?;
        Ok(())
    }),
    ("after", |c, v| {
        c.options.after = v.as_optional_string("after")?;
        Ok(())
    }),
    ("comment", |c, v| {
        c.options.comment = v.as_optional_string("comment")?;
        Ok(())
    }),
    ("values", |c, v| {
        c.options.values = v.as_list("values")?;
        Ok(())
    }),
];

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            options: ColumnOptions::default(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::BigInteger)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::DateTime)
    }

    pub fn decimal(name: impl Into<String>, precision: u32, scale: u32) -> Self {
        Self::new(name, ColumnType::Decimal).precision(precision).scale(scale)
    }

    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut column = Self::new(name, ColumnType::Enum);
        column.options.values = values.into_iter().map(Into::into).collect();
        column
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.options.precision = Some(precision);
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.options.scale = Some(scale);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.options.null = true;
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.options.null = null;
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.options.default = Some(default);
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.options.signed = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.options.identity = true;
        self
    }

    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.options.after = Some(column.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Apply an option map; unknown keys fail without mutating the column
    pub fn set_options<K, V, I>(&mut self, options: I) -> MigrationResult<&mut Self>
    where
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        apply_options(self, "column", COLUMN_OPTIONS, options)?;
        Ok(self)
    }

    /// Builder form of [`Column::set_options`]
    pub fn with_options<K, V, I>(mut self, options: I) -> MigrationResult<Self>
    where
        K: AsRef<str>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_options(options)?;
        Ok(self)
    }

    pub(crate) fn validate(&self) -> MigrationResult<()> {
        if self.name.trim().is_empty() {
            return Err(MigrationError::Validation(
                "column name must not be empty".to_string(),
            ));
        }
        if self.column_type == ColumnType::Enum && self.options.values.is_empty() {
            return Err(MigrationError::Validation(format!(
                "enum column '{}' requires at least one value",
                self.name
            )));
        }
        if let (Some(precision), Some(scale)) = (self.options.precision, self.options.scale) {
            if scale > precision {
                return Err(MigrationError::Validation(format!(
                    "column '{}' has scale {} larger than precision {}",
                    self.name, scale, precision
                )));
            }
        }
        if self.options.identity && !self.column_type.is_integer() {
            return Err(MigrationError::Validation(format!(
                "identity column '{}' must be an integer type, not {}",
                self.name, self.column_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_options() {
        let column = Column::string("email").limit(191).nullable().comment("login");
        assert_eq!(column.column_type, ColumnType::String);
        assert_eq!(column.options.limit, Some(191));
        assert!(column.options.null);
        assert_eq!(column.options.comment.as_deref(), Some("login"));
    }

    #[test]
    fn test_set_options_dispatch() {
        let mut column = Column::integer("age");
        column
            .set_options([
                ("signed", OptionValue::from(false)),
                ("default", OptionValue::from(18)),
                ("null", OptionValue::from(true)),
            ])
            .unwrap();
        assert!(!column.options.signed);
        assert!(column.options.null);
        assert_eq!(column.options.default, Some(ColumnDefault::Integer(18)));
    }

    #[test]
    fn test_unknown_option_leaves_column_untouched() {
        let mut column = Column::string("email");
        let before = column.clone();
        let result = column.set_options([("limit", OptionValue::from(10)), ("colour", OptionValue::from("red"))]);
        assert!(matches!(result, Err(MigrationError::Validation(_))));
        assert_eq!(column, before);
    }

    #[test]
    fn test_bad_value_leaves_column_untouched() {
        let mut column = Column::string("email");
        let result = column.set_options([("limit", OptionValue::from(10)), ("null", OptionValue::from("maybe"))]);
        assert!(result.is_err());
        assert_eq!(column.options.limit, None);
    }

    #[test]
    fn test_validation() {
        assert!(Column::new("status", ColumnType::Enum).validate().is_err());
        assert!(Column::enumeration("status", ["draft", "live"]).validate().is_ok());
        assert!(Column::decimal("price", 4, 6).validate().is_err());
        assert!(Column::string("id").identity().validate().is_err());
        assert_eq!("BigInteger".parse::<ColumnType>().unwrap(), ColumnType::BigInteger);
    }
}
