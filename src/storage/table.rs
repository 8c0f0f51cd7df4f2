use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::core::{Attributes, DbError, Key, Result, Row, Value};
use crate::schema::Model;

/// Rows of one model, kept in insertion order by an internal row id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    name: String,
    rows: BTreeMap<u64, Row>,
    next_row_id: u64,
    next_serial: i64,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
            next_row_id: 0,
            next_serial: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    /// Inserts a full row, assigning the serial key when it is unset.
    pub fn insert(&mut self, model: &Model, attributes: &Attributes) -> Result<Key> {
        let mut row = Row::new();
        for property in model.properties() {
            let value = attributes.get(&property.name).cloned().unwrap_or(Value::Null);
            row.insert(property.name.clone(), value);
        }

        if let Some(serial) = model.serial_property() {
            match row.get(&serial.name).and_then(Value::as_i64) {
                Some(explicit) => self.next_serial = self.next_serial.max(explicit + 1),
                None => {
                    row.insert(serial.name.clone(), Value::Integer(self.next_serial));
                    self.next_serial += 1;
                }
            }
        }

        self.validate_row(model, &row, None)?;

        let key = model.key_of(&row);
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        Ok(key)
    }

    pub fn update(&mut self, model: &Model, key: &Key, changed: &Attributes) -> Result<()> {
        let id = self.find_row_id(model, key).ok_or_else(|| {
            DbError::Persistence(format!("{} with key {} does not exist", model.name(), key))
        })?;

        let mut row = self.rows[&id].clone();
        for (name, value) in changed {
            model.require_property(name)?;
            row.insert(name.clone(), value.clone());
        }
        self.validate_row(model, &row, Some(id))?;
        self.rows.insert(id, row);
        Ok(())
    }

    pub fn delete(&mut self, model: &Model, key: &Key) -> Result<()> {
        let id = self.find_row_id(model, key).ok_or_else(|| {
            DbError::Persistence(format!("{} with key {} does not exist", model.name(), key))
        })?;
        self.rows.remove(&id);
        Ok(())
    }

    fn find_row_id(&self, model: &Model, key: &Key) -> Option<u64> {
        self.rows
            .iter()
            .find(|(_, row)| model.key_of(row) == *key)
            .map(|(id, _)| *id)
    }

    /// NOT NULL, key uniqueness and unique-property checks.
    fn validate_row(&self, model: &Model, row: &Row, ignore_id: Option<u64>) -> Result<()> {
        for property in model.properties() {
            let value = row.get(&property.name).unwrap_or(&Value::Null);
            if value.is_null() && (!property.nullable || property.key) {
                return Err(DbError::Persistence(format!(
                    "{}.{} cannot be NULL",
                    model.name(),
                    property.name
                )));
            }
            if !property.data_type.is_compatible(value) {
                return Err(DbError::Persistence(format!(
                    "{}.{} expects {}, got {}",
                    model.name(),
                    property.name,
                    property.data_type,
                    value.type_name()
                )));
            }
        }

        let key = model.key_of(row);
        for (id, existing) in &self.rows {
            if Some(*id) == ignore_id {
                continue;
            }
            if model.key_of(existing) == key {
                return Err(DbError::Persistence(format!(
                    "{} with key {} already exists",
                    model.name(),
                    key
                )));
            }
            for property in model.properties().iter().filter(|property| property.unique) {
                let value = row.get(&property.name).unwrap_or(&Value::Null);
                if !value.is_null() && existing.get(&property.name) == Some(value) {
                    return Err(DbError::Persistence(format!(
                        "Unique constraint violation: {}.{} already contains {}",
                        model.name(),
                        property.name,
                        value.inspect()
                    )));
                }
            }
        }

        Ok(())
    }
}
