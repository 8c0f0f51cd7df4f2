use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use super::{PersistenceGateway, Table};
use crate::core::{Attributes, DbError, Key, Result, Row};
use crate::query::Query;
use crate::schema::Model;

/// Gateway operations, used to inject failures in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Fetch,
    Create,
    Update,
    Delete,
}

/// Call counters, handy for asserting that a collection fetched at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub fetches: usize,
    pub counts: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

#[derive(Default, Serialize, Deserialize)]
struct MemoryState {
    tables: HashMap<String, Table>,
    #[serde(skip)]
    stats: GatewayStats,
    #[serde(skip)]
    failures: HashMap<GatewayOp, usize>,
}

/// In-process gateway: one table per model.
///
/// Cloning yields another handle to the same tables, so a test can keep a
/// handle for inspection after passing one to a repository.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> GatewayStats {
        self.state.borrow().stats
    }

    pub fn row_count(&self, model: &str) -> usize {
        self.state
            .borrow()
            .tables
            .get(model)
            .map_or(0, Table::row_count)
    }

    /// Makes the next call of `op` fail with a persistence error.
    pub fn fail_next(&self, op: GatewayOp) {
        *self.state.borrow_mut().failures.entry(op).or_insert(0) += 1;
    }

    /// Serialises every table to JSON.
    pub fn snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.state.borrow())?)
    }

    /// Replaces every table with the content of a snapshot.
    pub fn restore(&self, snapshot: &str) -> Result<()> {
        let restored: MemoryState = serde_json::from_str(snapshot)?;
        self.state.borrow_mut().tables = restored.tables;
        Ok(())
    }

    fn check_failure(state: &mut MemoryState, op: GatewayOp) -> Result<()> {
        if let Some(remaining) = state.failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(DbError::Persistence(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn fetch(&self, model: &Model, query: &Query) -> Result<Vec<Row>> {
        let mut state = self.state.borrow_mut();
        state.stats.fetches += 1;
        Self::check_failure(&mut state, GatewayOp::Fetch)?;

        let Some(table) = state.tables.get(model.name()) else {
            return Ok(Vec::new());
        };

        let mut matching = Vec::new();
        for row in table.scan() {
            if query.matches(row)? {
                matching.push(row.clone());
            }
        }

        let key_fields = model.key_fields();
        let rows: Vec<Row> = query
            .apply_window(matching)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(name, _)| {
                        key_fields.contains(name) || query.fields().contains(name)
                    })
                    .collect()
            })
            .collect();

        debug!(
            model = model.name(),
            offset = query.offset(),
            limit = ?query.limit(),
            rows = rows.len(),
            "memory gateway fetch"
        );
        Ok(rows)
    }

    fn count(&self, model: &Model, query: &Query) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        state.stats.counts += 1;
        Self::check_failure(&mut state, GatewayOp::Fetch)?;

        let Some(table) = state.tables.get(model.name()) else {
            return Ok(0);
        };
        let mut matching: usize = 0;
        for row in table.scan() {
            if query.matches(row)? {
                matching += 1;
            }
        }
        let windowed = matching.saturating_sub(query.offset());
        Ok(query.limit().map_or(windowed, |limit| windowed.min(limit)))
    }

    fn persist_create(&self, model: &Model, attributes: &Attributes) -> Result<Key> {
        let mut state = self.state.borrow_mut();
        state.stats.creates += 1;
        Self::check_failure(&mut state, GatewayOp::Create)?;

        let key = state
            .tables
            .entry(model.name().to_string())
            .or_insert_with(|| Table::new(model.name()))
            .insert(model, attributes)?;
        debug!(model = model.name(), key = %key, "memory gateway create");
        Ok(key)
    }

    fn persist_update(&self, model: &Model, key: &Key, changed: &Attributes) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.stats.updates += 1;
        Self::check_failure(&mut state, GatewayOp::Update)?;

        let table = state.tables.get_mut(model.name()).ok_or_else(|| {
            DbError::Persistence(format!("{} with key {} does not exist", model.name(), key))
        })?;
        table.update(model, key, changed)?;
        debug!(model = model.name(), key = %key, fields = changed.len(), "memory gateway update");
        Ok(())
    }

    fn persist_delete(&self, model: &Model, key: &Key) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.stats.deletes += 1;
        Self::check_failure(&mut state, GatewayOp::Delete)?;

        let table = state.tables.get_mut(model.name()).ok_or_else(|| {
            DbError::Persistence(format!("{} with key {} does not exist", model.name(), key))
        })?;
        table.delete(model, key)?;
        debug!(model = model.name(), key = %key, "memory gateway delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::core::{DataType, Value};
    use crate::query::QueryOptions;
    use crate::schema::Property;

    fn model() -> Model {
        Model::new("Article")
            .property(Property::serial("id"))
            .property(Property::string("title"))
            .property(Property::new("content", DataType::Text))
    }

    fn seeded() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        for n in 1..=4 {
            gateway
                .persist_create(&model(), &attrs! { "title" => format!("T{}", n), "content" => "body" })
                .unwrap();
        }
        gateway
    }

    #[test]
    fn test_fetch_projects_and_windows() {
        let gateway = seeded();
        let query = Query::with_options(
            "default",
            &model(),
            &QueryOptions::new().offset(1).limit(2),
        )
        .unwrap();
        let rows = gateway.fetch(&model(), &query).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(2)));
        assert!(rows[0].contains_key("title"));
        assert!(!rows[0].contains_key("content"));
    }

    #[test]
    fn test_count_respects_window() {
        let gateway = seeded();
        let count = |options: QueryOptions| {
            let query = Query::with_options("default", &model(), &options).unwrap();
            gateway.count(&model(), &query).unwrap()
        };

        assert_eq!(count(QueryOptions::new()), 4);
        assert_eq!(count(QueryOptions::new().gt("id", 1)), 3);
        assert_eq!(count(QueryOptions::new().offset(1).limit(2)), 2);
        assert_eq!(count(QueryOptions::new().offset(3).limit(5)), 1);
        assert_eq!(gateway.stats().counts, 4);
        assert_eq!(gateway.stats().fetches, 0);
    }

    #[test]
    fn test_fetch_with_raw_condition() {
        let gateway = seeded();
        let query = Query::with_options(
            "default",
            &model(),
            &QueryOptions::new().raw("title = ?", vec!["T3".into()]),
        )
        .unwrap();
        let rows = gateway.fetch(&model(), &query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let gateway = seeded();
        gateway.fail_next(GatewayOp::Create);
        assert!(gateway.persist_create(&model(), &attrs! { "title" => "x" }).is_err());
        assert!(gateway.persist_create(&model(), &attrs! { "title" => "x" }).is_ok());
        assert_eq!(gateway.stats().creates, 6);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let gateway = seeded();
        let snapshot = gateway.snapshot().unwrap();

        let restored = MemoryGateway::new();
        restored.restore(&snapshot).unwrap();
        assert_eq!(restored.row_count("Article"), 4);

        // serials continue after a restore
        let key = restored.persist_create(&model(), &attrs! { "title" => "T5" }).unwrap();
        assert_eq!(key, Key::from(5));
    }
}
