#![forbid(unsafe_code)]

pub mod archive_http;
pub mod archive_memory;
pub mod http_common;
pub mod metadata_index;
