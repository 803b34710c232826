#![forbid(unsafe_code)]

pub mod common;
pub mod history;
pub mod sample;
pub mod signal;
pub mod species;

pub use common::{ContractViolation, ReasonCodeId, UnixTimeSec, Validate};
