#![forbid(unsafe_code)]

pub mod field_extract;
pub mod physics;
pub mod sample_build;
pub mod source_fetch;
pub mod species;
