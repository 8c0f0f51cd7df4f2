//! Everything needed to declare models and work with collections.

pub use crate::attrs;
pub use crate::collection::{Collection, Delegated, Entry, SliceSpec};
pub use crate::core::{Attributes, DataType, DbError, Key, Result, Value};
pub use crate::facade::Database;
pub use crate::query::{Condition, Direction, Order, Query, QueryOptions};
pub use crate::repository::{Repository, RepositoryConfig};
pub use crate::resource::Resource;
pub use crate::schema::{Model, ModelRegistry, Property, Relationship};
pub use crate::storage::{GatewayOp, MemoryGateway, PersistenceGateway};
