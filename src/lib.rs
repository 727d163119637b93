//! Real-time object synchronization and local-history engine for
//! collaborative canvases.
//!
//! ARCHITECTURE
//! ============
//! - `store`: durable object store (Postgres or in-memory), the system of
//!   record.
//! - `channel`: ephemeral broadcast of partial deltas between clients.
//! - `cache`: per-session object map with selection and clipboard.
//! - `history`: bounded undo/redo stacks and their replay plans.
//! - `services`: the sync hub that ties the above together, plus live
//!   transforms, shape previews and agent actions.

pub mod cache;
pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod model;
pub mod services;
pub mod store;
pub mod throttle;

#[cfg(test)]
#[path = "helpers_test.rs"]
pub(crate) mod test_helpers;
