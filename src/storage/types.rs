//! Core data types for the segment storage layer
//!
//! - `FieldType` / `FieldInfo` / `IndexInfo`: the schema of an index
//! - `Value`: one typed field value
//! - `Event`: one ingested record (timestamp plus named values)

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::storage::error::{StorageError, StorageResult};

/// Name of the implicit timestamp field, always field 0
pub const TIME_FIELD: &str = "_time";

/// Column type, stored as a `u8` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FieldType {
    Int = 0,
    Float = 1,
    /// Free text, indexed per token
    Text = 2,
    /// Exact-match string, indexed whole
    Keyword = 3,
    /// Milliseconds since the Unix epoch
    Timestamp = 4,
}

impl FieldType {
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Keyword)
    }
}

impl TryFrom<u8> for FieldType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FieldType::Int),
            1 => Ok(FieldType::Float),
            2 => Ok(FieldType::Text),
            3 => Ok(FieldType::Keyword),
            4 => Ok(FieldType::Timestamp),
            _ => Err(StorageError::Corruption(format!(
                "Unknown field type: {}",
                value
            ))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Text => write!(f, "text"),
            FieldType::Keyword => write!(f, "keyword"),
            FieldType::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Field names double as file names inside the segment directory
fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub id: u32,
    pub name: String,
    pub field_type: FieldType,
    /// Whether a value index (`.pos` + `.ipos`) is built
    pub indexed: bool,
}

/// Schema of a logical index: `_time` followed by user fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    fields: Vec<FieldInfo>,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![FieldInfo {
                id: 0,
                name: TIME_FIELD.to_string(),
                field_type: FieldType::Timestamp,
                indexed: false,
            }],
        }
    }

    /// Append a field, returning its id
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
        indexed: bool,
    ) -> StorageResult<u32> {
        let name = name.into();
        if !is_valid_field_name(&name) {
            return Err(StorageError::InvalidState(format!(
                "Invalid field name {:?}: use letters, digits, '_' or '-'",
                name
            )));
        }
        if self.field(&name).is_some() {
            return Err(StorageError::InvalidState(format!(
                "Field {} is already declared",
                name
            )));
        }
        let id = self.fields.len() as u32;
        self.fields.push(FieldInfo {
            id,
            name,
            field_type,
            indexed,
        });
        Ok(id)
    }

    /// Builder: append a field
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType, indexed: bool) -> StorageResult<Self> {
        self.add_field(name, field_type, indexed)?;
        Ok(self)
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Rebuild from fields read back from disk
    pub(crate) fn from_parts(name: String, fields: Vec<FieldInfo>) -> StorageResult<Self> {
        match fields.first() {
            Some(f) if f.name == TIME_FIELD && f.field_type == FieldType::Timestamp => {}
            _ => {
                return Err(StorageError::Corruption(format!(
                    "Field 0 of index {} is not {}",
                    name, TIME_FIELD
                )))
            }
        }
        Ok(Self { name, fields })
    }
}

/// One typed field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(i64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Whether this value can be stored in a column of `field_type`
    pub fn fits(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Int(_), FieldType::Int)
                | (Value::Float(_), FieldType::Float)
                | (Value::Str(_), FieldType::Text | FieldType::Keyword)
                | (Value::Timestamp(_), FieldType::Timestamp)
        )
    }

    /// Parse user input (CLI) as a value of `field_type`
    pub fn parse(input: &str, field_type: FieldType) -> StorageResult<Self> {
        let bad = |reason: String| StorageError::TypeMismatch {
            field: "value".to_string(),
            expected: field_type.to_string(),
            found: format!("{:?} ({})", input, reason),
        };
        match field_type {
            FieldType::Int => input
                .parse()
                .map(Value::Int)
                .map_err(|e| bad(e.to_string())),
            FieldType::Float => input
                .parse()
                .map(Value::Float)
                .map_err(|e| bad(e.to_string())),
            // epoch millis or RFC 3339
            FieldType::Timestamp => match input.parse::<i64>() {
                Ok(ms) => Ok(Value::Timestamp(ms)),
                Err(_) => chrono::DateTime::parse_from_rfc3339(input)
                    .map(|dt| Value::Timestamp(dt.timestamp_millis()))
                    .map_err(|e| bad(e.to_string())),
            },
            FieldType::Text | FieldType::Keyword => Ok(Value::Str(input.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// One ingested record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Milliseconds since the Unix epoch, stored in `_time`
    pub timestamp: i64,
    pub values: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Builder method: set a field value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Value for a field; `_time` resolves to the timestamp
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == TIME_FIELD {
            return Some(Value::Timestamp(self.timestamp));
        }
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_info_starts_with_time() {
        let mut info = IndexInfo::new("web");
        assert_eq!(info.fields().len(), 1);
        assert_eq!(info.fields()[0].name, TIME_FIELD);
        assert_eq!(info.fields()[0].field_type, FieldType::Timestamp);

        let id = info.add_field("status", FieldType::Int, true).unwrap();
        assert_eq!(id, 1);
        assert_eq!(info.field("status").unwrap().id, 1);
        assert!(info.add_field("status", FieldType::Keyword, false).is_err());
        assert!(info.add_field("../etc", FieldType::Keyword, false).is_err());
        assert!(info.add_field("", FieldType::Int, false).is_err());
    }

    #[test]
    fn test_field_type_tags() {
        for tag in 0u8..5 {
            assert_eq!(FieldType::try_from(tag).unwrap() as u8, tag);
        }
        assert!(FieldType::try_from(5).is_err());
        assert_eq!(FieldType::Keyword.to_string(), "keyword");
    }

    #[test]
    fn test_value_fits() {
        assert!(Value::from("x").fits(FieldType::Text));
        assert!(Value::from("x").fits(FieldType::Keyword));
        assert!(Value::from(1i64).fits(FieldType::Int));
        assert!(!Value::from(1i64).fits(FieldType::Float));
        assert!(!Value::Int(5).fits(FieldType::Timestamp));
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("42", FieldType::Int).unwrap(), Value::Int(42));
        assert_eq!(Value::parse("1.5", FieldType::Float).unwrap(), Value::Float(1.5));
        assert_eq!(
            Value::parse("GET", FieldType::Keyword).unwrap(),
            Value::Str("GET".into())
        );
        assert_eq!(
            Value::parse("1970-01-01T00:00:01Z", FieldType::Timestamp).unwrap(),
            Value::Timestamp(1_000)
        );
        assert!(matches!(
            Value::parse("abc", FieldType::Int),
            Err(StorageError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new(1_000).with("host", "a").with("bytes", 512i64);
        assert_eq!(event.get("host"), Some(Value::Str("a".into())));
        assert_eq!(event.get(TIME_FIELD), Some(Value::Timestamp(1_000)));
        assert_eq!(event.get("missing"), None);
    }
}
