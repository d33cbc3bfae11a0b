pub mod store;
pub mod memory_store;
