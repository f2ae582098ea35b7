//! Request handler module
//!
//! Responsible for request routing dispatch and business logic processing:
//! static file serving and the generate proxy.

pub mod generate;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
