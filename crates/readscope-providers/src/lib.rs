//! readscope-providers: generative narrative backends and configuration.
//!
//! Implements the `NarrativeGenerator` trait for Anthropic and Ollama, plus a
//! mock for tests, and loads `readscope.toml`.

pub mod anthropic;
pub mod config;
pub mod mock;
pub mod ollama;

pub use config::{create_provider, load_config, load_config_from, ProviderConfig, ReadscopeConfig};
pub use readscope_core::error::ProviderError;
