pub mod key;
pub mod block;
pub mod cursor;
pub mod node_set;
pub mod pending;
pub mod progress;
pub mod element_index;
pub mod structural_join;
