pub mod model;
pub mod property;
pub mod registry;

pub use model::{Delegate, Model, ModelMethod, Relationship};
pub use property::Property;
pub use registry::ModelRegistry;
