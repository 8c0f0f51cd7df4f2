use crate::core::{Attributes, Key, Result, Row};
use crate::query::Query;
use crate::schema::Model;

/// Persistence gateway - the only storage surface collections depend on.
///
/// Implementations must translate conditions, order, limit and offset
/// faithfully, pass raw conditions through, and project only the queried
/// fields (key fields are always included). Every write is atomic per
/// resource: it either fully applies or returns an error.
pub trait PersistenceGateway {
    /// Rows matching `query`, in query order.
    fn fetch(&self, model: &Model, query: &Query) -> Result<Vec<Row>>;

    /// Number of rows `query` selects, window included. Reads from the end
    /// of a scope are turned into forward windows with this.
    fn count(&self, model: &Model, query: &Query) -> Result<usize> {
        Ok(self.fetch(model, query)?.len())
    }

    /// Stores a new record and returns its key, filling in serial components.
    fn persist_create(&self, model: &Model, attributes: &Attributes) -> Result<Key>;

    /// Writes `changed` onto the record identified by `key`.
    fn persist_update(&self, model: &Model, key: &Key, changed: &Attributes) -> Result<()>;

    /// Removes the record identified by `key`.
    fn persist_delete(&self, model: &Model, key: &Key) -> Result<()>;
}
