use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use super::Value;

/// Property name to value. Ordered so that equality and rendering are stable.
pub type Attributes = BTreeMap<String, Value>;

/// One raw record returned by a gateway: only the projected fields are present.
pub type Row = BTreeMap<String, Value>;

/// Ordered tuple identifying a resource within its model and repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Key(pub Vec<Value>);

impl Key {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A key is complete when no component is blank.
    pub fn is_complete(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|value| !value.is_blank())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Value::inspect).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl From<Vec<Value>> for Key {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self(vec![Value::Integer(value)])
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self(vec![Value::from(value)])
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(vec![Value::from(value)])
    }
}

/// Builds an [`Attributes`] map: `attrs! { "title" => "Sample", "id" => 1 }`.
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::core::Attributes::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut attributes = $crate::core::Attributes::new();
        $(attributes.insert(($name).to_string(), $crate::core::Value::from($value));)+
        attributes
    }};
}
