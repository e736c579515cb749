pub mod actor;
pub mod messages;

pub use actor::{spawn_dispatcher, BackendActor, Dispatcher};
pub use messages::{BackendCommand, BackendEvent};
