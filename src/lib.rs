//! Static web server with a Gemini image-generation proxy.
//!
//! Serves a fixed public directory over GET and forwards `POST /api/generate`
//! prompts to the Gemini `generateContent` endpoint, relaying a simplified
//! JSON result back to the caller.

pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod upstream;
