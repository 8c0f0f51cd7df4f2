// ============================================================================
// memorm Library
// ============================================================================

//! Lazy, query-scoped collections of persisted resources.
//!
//! # Examples
//!
//! ```
//! use memorm::prelude::*;
//!
//! # fn main() -> memorm::Result<()> {
//! let db = Database::new();
//! db.define(
//!     Model::new("Article")
//!         .property(Property::serial("id"))
//!         .property(Property::string("title")),
//! )?;
//!
//! let articles = db.all("Article", &QueryOptions::new().eq("title", "Sample"))?;
//! let article = articles.create(&attrs! {})?;
//! assert_eq!(article.get("title")?, Value::from("Sample"));
//! assert!(articles.last()?.unwrap().same(&article));
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod schema;
pub mod query;
pub mod storage;
pub mod repository;
pub mod resource;
pub mod collection;
pub mod facade;
pub mod prelude;

// Re-export main types for convenience
pub use facade::Database;
pub use core::{Attributes, DataType, DbError, Key, Result, Value};
pub use collection::{Collection, Delegated, Entry, SliceSpec};
pub use query::{Query, QueryOptions};
pub use repository::{Repository, RepositoryConfig};
pub use resource::Resource;
pub use schema::{Model, ModelRegistry, Property};
