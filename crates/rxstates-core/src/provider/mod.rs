//! Provider adapters for search-grounded validation backends.
//!
//! Provides one trait over the supported backends (OpenAI deep research,
//! Google Gemini), the prompt they share, and the retry classification the
//! orchestrator applies to their failures.

pub(crate) mod backend;
pub(crate) mod google;
pub(crate) mod openai;
pub(crate) mod prompt;
pub(crate) mod retry;

pub use backend::{resolve_env_var, Provider, ProviderFactory, RawReply, ValidationProvider};
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
