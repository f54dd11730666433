//! LLM Provider implementations for Ragline.
//!
//! All providers implement the `ragline_core::Provider` trait.
//! [`build_from_config`] creates the shared client instance once at startup.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, default_base_url, is_local};
