// crates/kashi-server/src/routes/mod.rs
//! HTTP route handlers, one file per surface.

pub mod debug;
pub mod health;
pub mod jobs;
