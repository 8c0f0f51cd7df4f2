pub mod engine;
pub mod memory;
pub mod table;

pub use engine::PersistenceGateway;
pub use memory::{GatewayOp, GatewayStats, MemoryGateway};
pub use table::Table;
