#![forbid(unsafe_code)]

pub mod classifier_state;
pub mod fs_io;
pub mod history;
pub mod snapshot;

pub use fs_io::StorageError;
