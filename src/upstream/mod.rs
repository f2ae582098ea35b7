//! Upstream generation service module

pub mod gemini;

pub use gemini::GeminiClient;
