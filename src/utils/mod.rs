//! Configuration, persistence, errors and the filing policy

pub mod bindings;
pub mod config;
pub mod error;
pub mod organizer;
pub mod paths;

// Re-export for convenience
pub use bindings::SourceBindings;
pub use config::{AppSettings, FilerSettings, SessionSettings};
pub use error::RecorderError;
pub use organizer::{
    compute_destination, FilingRequest, FolderNames, OrganizationPolicy, OrganizeMode, Placement,
    SkipReason,
};
pub use paths::{get_bindings_path, get_config_dir, get_settings_path};
