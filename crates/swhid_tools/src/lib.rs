#![forbid(unsafe_code)]

pub mod inspect_cli;
pub mod mapping_cli;
