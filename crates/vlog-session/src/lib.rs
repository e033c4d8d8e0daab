//! On-disk incremental session state.
//!
//! A session directory holds everything an append needs to continue a
//! render in a separate process invocation: metadata, per-segment
//! elementary streams, and the raw last-frame cache that seeds the next
//! transition.

pub mod error;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use store::SessionStore;
