pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Attributes, Key, Row};
pub use value::{DataType, Value};
