//! Chat completion clients used by the distiller.

mod openai;
pub mod transport;

pub use openai::OpenAiCompatClient;
pub use transport::{HttpTransport, ReqwestTransport, build_http_client};

use crate::Result;
use crate::cancel::CancelToken;

/// Trait for chat completion providers.
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for a system and user prompt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transport`] if the request fails, or
    /// [`crate::Error::Parse`] if the response has no completion text.
    fn complete_with_system(&self, system: &str, user: &str, cancel: &CancelToken)
    -> Result<String>;
}
