//! Filesystem side of filing

pub mod mover;

pub use mover::{copy_then_remove, move_file, numbered_filename, Filer};
