use serde::{Deserialize, Serialize};
use crate::core::{DataType, Value};

/// A typed attribute declared on a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub data_type: DataType,
    /// Part of the model key.
    pub key: bool,
    /// Key value assigned by the gateway on create.
    pub serial: bool,
    /// Left out of default field projections; loaded on first access.
    pub lazy: bool,
    pub nullable: bool,
    pub unique: bool,
    pub max_length: Option<usize>,
    pub default: Option<Value>,
}

impl Property {
    /// `Text` properties are lazy unless told otherwise.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            key: false,
            serial: false,
            lazy: data_type == DataType::Text,
            nullable: true,
            unique: false,
            max_length: None,
            default: None,
        }
    }

    /// Shorthand for an auto-incrementing integer key.
    pub fn serial(name: impl Into<String>) -> Self {
        let mut property = Self::new(name, DataType::Integer);
        property.key = true;
        property.serial = true;
        property
    }

    /// Non-lazy text column (the `String` type of the model DSL).
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Text).lazy(false)
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self.nullable = false;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Checks a value against the declared constraints. Serial keys may be
    /// unset because the gateway fills them in.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        if value.is_null() {
            if !self.nullable && !self.serial {
                return Err(format!("{} must not be blank", self.name));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(format!(
                "{} expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            ));
        }

        if let (Some(max), Value::Text(text)) = (self.max_length, value)
            && text.chars().count() > max
        {
            return Err(format!(
                "{} must be at most {} characters long",
                self.name, max
            ));
        }

        Ok(())
    }
}
