//! # TaskNest Store
//!
//! Key-value persistence with strict per-owner isolation. Every physical
//! key is prefixed by the owner identifier (`{owner}/{kind}/{id}`) and a
//! per-owner index (`{owner}/index/{kind}`) supports listing without
//! scanning the whole store. The owner prefix is the sole authorization
//! mechanism at this layer — a key is unreachable without already
//! knowing the caller's own owner id.

pub mod filter;
pub mod kv;
pub mod tasks;

pub use filter::{TaskFilter, TaskSort};
pub use kv::{KvEngine, MemoryKv, SqliteKv};
pub use tasks::TaskStore;
