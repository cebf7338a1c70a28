//! Identity listing: the directory of emulated middlewares handed to an
//! external announcer once at startup.

pub mod announcer;
pub mod listing;

pub use announcer::{publish_in_background, Announcer, ScriptAnnouncer};
pub use listing::{IdentityFormat, IdentityListing};
