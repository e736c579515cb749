//! Title resolution for the captured window/application

pub mod host;
pub mod models;
pub mod resolver;
pub mod traits;

pub use host::StaticHost;
pub use models::{SceneInfo, SourceId, SourceInfo, SourceKind, TitleResolution};
pub use resolver::{sanitize_title, TitleResolver};
pub use traits::CaptureHost;
