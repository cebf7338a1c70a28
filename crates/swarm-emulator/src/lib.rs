pub mod cli;
pub mod engine;
pub mod error;
pub mod identity;
pub mod metrics;

pub use engine::dispatcher::{dispatch, DispatchReport, GroupExit};
pub use engine::group::{run_group, GroupReport};
pub use engine::listener::{serve, DrainOutcome, ListenerReport, ListenerSettings};
pub use engine::planner::{plan, EndpointSpec, Plan, PortBucket};
pub use error::{EmulatorError, Result};
pub use identity::{Announcer, IdentityListing, ScriptAnnouncer};
