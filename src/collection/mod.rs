pub mod collection;
pub mod cache;
pub mod store;
