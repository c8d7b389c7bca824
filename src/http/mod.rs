//! HTTP protocol layer module
//!
//! Protocol-level helpers decoupled from the GIS API: status responses,
//! `ETag` handling and content types.

pub mod cache;
pub mod mime;
pub mod response;

// Re-export commonly used types
pub use response::{
    build_304_response, build_404_response, build_405_response, build_413_response,
    build_cached_response, build_options_response, build_text_response,
};
