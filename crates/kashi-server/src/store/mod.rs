// crates/kashi-server/src/store/mod.rs
//! Storage layer: the KV engine and the job store built on top of it.

pub mod jobs;
pub mod kv;

pub use jobs::{change_channel, user_from_channel, JobStore, JobView, StoreError};
pub use kv::{KvEvent, MemoryKv};
