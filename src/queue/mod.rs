pub mod manager;

pub use manager::{Drain, FilingQueue};
