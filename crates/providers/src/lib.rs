//! Language-model provider implementations for Augur.
//!
//! All providers implement the `augur_core::Provider` trait.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
