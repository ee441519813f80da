#[macro_use]
pub mod errors;

pub mod backup;
pub mod command;
pub mod database;
pub mod demo;
pub mod export;
pub mod http;
pub mod persistence;
pub mod session;
pub mod shell;
pub mod storage;

pub use database::Database;
pub use errors::Error;
pub use persistence::PersistentDatabase;
pub use storage::{BPlusTree, Key, Value};
