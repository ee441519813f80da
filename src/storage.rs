//! In-memory storage engine: a B+ tree over an arena of nodes.
pub mod arena;
pub mod btree;
pub mod node;
pub mod observer;
pub mod validate;
pub mod value;

pub use btree::{BPlusTree, NodeKind, NodeView, TreeSnapshot, TreeStatistics, MIN_ORDER};
pub use observer::{TracingObserver, TreeEvent, TreeObserver};
pub use validate::ValidationError;
pub use value::Value;

/// Key type used by the database layer.
pub type Key = i64;

/// The tree the database stores its entries in.
pub type Tree = BPlusTree<Key, Value>;
