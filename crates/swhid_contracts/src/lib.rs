#![forbid(unsafe_code)]

pub mod archive;
pub mod attribution;
pub mod common;
pub mod index;
pub mod swhid;

pub use common::{ContractViolation, SchemaVersion, UnixTimeNs, Validate};
