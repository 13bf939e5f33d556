//! Provider HTTP client
//!
//! OpenAI-compatible chat completions with client-side rate limiting, typed
//! status mapping and vision inputs as inline data URLs.

pub mod client;
pub mod types;

pub use client::HttpProviderClient;
