//! llama.cpp backend for quantbench
//!
//! Models are served by a `llama-server` child process, one per loaded
//! model, and driven over its native HTTP API. Token streaming uses the
//! server's server-sent events; embeddings come from any OpenAI-compatible
//! `/v1/embeddings` endpoint.

pub mod embedding;
pub mod server;
pub mod stream;

pub use embedding::{EmbeddingConfig, HttpEmbedder};
pub use server::{LlamaServerConfig, LlamaServerHandle, LlamaServerLoader};
pub use stream::CompletionStream;

use quantbench_core::BenchError;

/// Build a blocking HTTP client. `timeout` of `None` waits indefinitely,
/// which streaming generations need.
pub(crate) fn http_client(
    timeout: Option<std::time::Duration>,
) -> quantbench_core::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            BenchError::configuration(
                "HTTP_CLIENT_INIT_FAILED",
                format!("Cannot create HTTP client: {}", e),
                "Initializing the llama.cpp backend",
                "Check the TLS configuration of this system",
                "server",
            )
        })
}
