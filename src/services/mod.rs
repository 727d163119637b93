//! Session services built on the store and channel collaborators.
//!
//! ARCHITECTURE
//! ============
//! `objects` pairs every durable write with an ephemeral broadcast. `sync`
//! owns the per-session cache and history and is the only mutation surface;
//! `transform` and `replay` extend it with the live-gesture protocol and the
//! undo/redo drivers. `preview` and `agent` sit on top of those.

pub mod agent;
pub mod objects;
pub mod preview;
pub mod replay;
pub mod sync;
pub mod transform;
