//! Request handler module
//!
//! Routes every request to a health probe, the GIS API or the static
//! front-end bundle.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
