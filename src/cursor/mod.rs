//! Cursor sharing: outbound sampling and inbound storage.
//!
//! ARCHITECTURE
//! ============
//! `broadcaster` turns local pointer and scroll input into outbound
//! payloads. `store` owns the map of remote cursors. Both are synchronous
//! and take explicit timestamps; the session driver supplies the clock.

pub mod broadcaster;
pub mod store;

pub use broadcaster::{CursorBroadcaster, Viewport};
pub use store::{CursorStore, IgnoreReason, IngestOutcome};
