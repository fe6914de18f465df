//! Generative model providers for Foreman.
//!
//! All providers implement the `foreman_core::Provider` trait. The loader
//! turns `[model]` configuration into a [`ModelHandle`].

pub mod loader;
pub mod openai_compat;

pub use loader::{ModelHandle, default_base_url, load_model};
pub use openai_compat::OpenAiCompatProvider;
