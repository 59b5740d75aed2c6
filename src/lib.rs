//! Live presence for a single-page site: visitor count, remote cursors and
//! join notices over a shared publish/subscribe channel.
//!
//! ARCHITECTURE
//! ============
//! - [`identity`]: per-session visitor id and color
//! - [`channel`]: the pub/sub contract plus in-process and websocket backends
//! - [`presence`], [`cursor`], [`notice`]: pure state, fed one event at a time
//! - [`session`]: the driver task that owns that state for one page
//! - [`relay`]: an axum server exposing a hub to websocket clients

pub mod channel;
pub mod config;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod identity;
pub mod notice;
pub mod presence;
pub mod relay;
pub mod session;

pub use session::LiveSession;
