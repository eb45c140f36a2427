//! `llama-server` child processes as model handles

use crate::{http_client, stream::CompletionStream};
use quantbench_core::{
    backend::{GenerationRequest, IncrementStream, ModelHandle, ModelLoader},
    config::ModelConfig,
    dataset::model_identity,
    BenchError, Result,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to launch and reach `llama-server`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlamaServerConfig {
    /// Server executable; looked up on `PATH` when not absolute
    pub binary: PathBuf,
    pub host: String,
    pub port: u16,
    /// How long to wait for `/health` to report ready
    pub startup_timeout_secs: u64,
    /// Additional command-line arguments passed through verbatim
    pub extra_args: Vec<String>,
}

impl Default for LlamaServerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("llama-server"),
            host: "127.0.0.1".to_string(),
            port: 8089,
            startup_timeout_secs: 120,
            extra_args: Vec::new(),
        }
    }
}

impl LlamaServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(BenchError::invalid_parameter(
                "INVALID_SERVER_PORT",
                "llama-server needs a fixed port",
                "Server configuration",
                "Pick an unused port such as 8089",
                "server.port",
                "0",
                "1-65535",
            ));
        }
        if self.startup_timeout_secs == 0 {
            return Err(BenchError::invalid_parameter(
                "INVALID_STARTUP_TIMEOUT",
                "Startup timeout must be positive",
                "Server configuration",
                "Large models can take minutes to load; 120 seconds is a reasonable start",
                "server.startup_timeout_secs",
                "0",
                "1 or more",
            ));
        }
        Ok(())
    }

    /// Command-line arguments for serving `model` with `config`
    pub fn args(&self, model: &Path, config: &ModelConfig) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            model.display().to_string(),
            "-c".to_string(),
            config.context_size.to_string(),
            "-t".to_string(),
            config.num_threads.to_string(),
            "-ngl".to_string(),
            config.gpu_layers.to_string(),
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Starts one `llama-server` per loaded model
pub struct LlamaServerLoader {
    config: LlamaServerConfig,
    client: Client,
}

impl LlamaServerLoader {
    pub fn new(config: LlamaServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client: http_client(None)?,
        })
    }

    pub fn config(&self) -> &LlamaServerConfig {
        &self.config
    }

    fn load_error(&self, model: &str, code: &'static str, message: String) -> BenchError {
        BenchError::load_failure(
            code,
            message,
            format!("Starting {}", self.config.binary.display()),
            "Run the server by hand with the same model to see its output",
            model,
        )
    }

    /// A server left over on the port would answer health checks for the new one
    fn ensure_port_free(&self, model: &str) -> Result<()> {
        TcpListener::bind((self.config.host.as_str(), self.config.port))
            .map(drop)
            .map_err(|e| {
                self.load_error(
                    model,
                    "PORT_IN_USE",
                    format!("Cannot bind {}: {}", self.config.base_url(), e),
                )
            })
    }

    fn wait_until_ready(&self, child: &mut Child, model: &str) -> Result<()> {
        let url = format!("{}/health", self.config.base_url());
        let deadline = Instant::now() + Duration::from_secs(self.config.startup_timeout_secs);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(self.load_error(
                        model,
                        "SERVER_EXITED",
                        format!("llama-server exited during startup with {}", status),
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(self.load_error(
                        model,
                        "SERVER_STATUS_UNKNOWN",
                        format!("Cannot query llama-server status: {}", e),
                    ));
                }
            }

            match self.client.get(&url).timeout(HEALTH_POLL_INTERVAL * 4).send() {
                Ok(response) if response.status().is_success() => {
                    // Only our own child may answer
                    if let Ok(Some(status)) = child.try_wait() {
                        return Err(self.load_error(
                            model,
                            "SERVER_EXITED",
                            format!("llama-server exited during startup with {}", status),
                        ));
                    }
                    return Ok(());
                }
                Ok(response) => debug!("llama-server not ready yet ({})", response.status()),
                Err(e) => debug!("llama-server not reachable yet: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(self.load_error(
                    model,
                    "SERVER_STARTUP_TIMEOUT",
                    format!(
                        "llama-server did not become ready within {}s",
                        self.config.startup_timeout_secs
                    ),
                ));
            }
            std::thread::sleep(HEALTH_POLL_INTERVAL);
        }
    }
}

impl ModelLoader for LlamaServerLoader {
    type Handle = LlamaServerHandle;

    fn load(&self, path: &Path, config: &ModelConfig) -> Result<LlamaServerHandle> {
        let name = model_identity(path);
        let size = std::fs::metadata(path)
            .map_err(|e| BenchError::from(e).with_path(path))?
            .len();

        self.ensure_port_free(&name)?;
        let args = self.config.args(path, config);
        debug!("Spawning {} {}", self.config.binary.display(), args.join(" "));
        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                self.load_error(
                    &name,
                    "SERVER_SPAWN_FAILED",
                    format!("Cannot start {}: {}", self.config.binary.display(), e),
                )
            })?;

        if let Err(e) = self.wait_until_ready(&mut child, &name) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
        info!("llama-server ready for {} on {}", name, self.config.base_url());

        Ok(LlamaServerHandle {
            name,
            size,
            config: config.clone(),
            base_url: self.config.base_url(),
            client: self.client.clone(),
            child: Some(child),
        })
    }
}

#[derive(Serialize)]
struct CompletionPayload<'a> {
    prompt: &'a str,
    n_predict: usize,
    temperature: f32,
    stop: &'a [String],
    stream: bool,
    cache_prompt: bool,
}

impl<'a> CompletionPayload<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            prompt: request.prompt(),
            n_predict: request.max_tokens(),
            temperature: request.temperature(),
            stop: request.stop_sequences(),
            stream: true,
            cache_prompt: false,
        }
    }
}

#[derive(Serialize)]
struct TokenizePayload<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    tokens: Vec<u32>,
}

/// A model served by a running `llama-server`. Dropping the handle stops
/// the server.
#[derive(Debug)]
pub struct LlamaServerHandle {
    name: String,
    size: u64,
    config: ModelConfig,
    base_url: String,
    client: Client,
    child: Option<Child>,
}

impl LlamaServerHandle {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ModelHandle for LlamaServerHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn size_bytes(&self) -> u64 {
        self.size
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn process_id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn generate(&self, request: &GenerationRequest) -> Result<IncrementStream<'_>> {
        let url = format!("{}/completion", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CompletionPayload::from_request(request))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                BenchError::generation(
                    "GENERATION_REQUEST_FAILED",
                    format!("Completion request failed: {}", e),
                    format!("POST {}", url),
                    "Check that llama-server is still running",
                )
                .for_model(&self.name)
            })?;

        Ok(Box::new(CompletionStream::new(BufReader::new(response))))
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let url = format!("{}/tokenize", self.base_url);
        let tokenizer_error = |e: reqwest::Error| {
            BenchError::tokenizer(
                "TOKENIZE_REQUEST_FAILED",
                format!("Tokenize request failed: {}", e),
                format!("POST {}", url),
                "Check that llama-server is still running",
            )
        };
        let response: TokenizeResponse = self
            .client
            .post(&url)
            .json(&TokenizePayload { content: text })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(tokenizer_error)?
            .json()
            .map_err(tokenizer_error)?;
        Ok(response.tokens)
    }
}

impl Drop for LlamaServerHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("Failed to stop llama-server for {}: {}", self.name, e);
            }
            match child.wait() {
                Ok(status) => debug!("llama-server for {} stopped ({})", self.name, status),
                Err(e) => warn!("Failed to reap llama-server for {}: {}", self.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantbench_core::config::GenerationParams;

    #[test]
    fn test_server_args() {
        let server = LlamaServerConfig {
            extra_args: vec!["--mlock".to_string()],
            ..Default::default()
        };
        let config = ModelConfig {
            context_size: 4096,
            num_threads: 8,
            gpu_layers: 35,
        };
        let args = server.args(Path::new("/models/tiny-q4_0.gguf"), &config);
        assert_eq!(
            args,
            vec![
                "-m",
                "/models/tiny-q4_0.gguf",
                "-c",
                "4096",
                "-t",
                "8",
                "-ngl",
                "35",
                "--host",
                "127.0.0.1",
                "--port",
                "8089",
                "--mlock"
            ]
        );
    }

    #[test]
    fn test_completion_payload_streams() {
        let request = GenerationRequest::new("Question: 2+2?", &GenerationParams::free_form());
        let value = serde_json::to_value(CompletionPayload::from_request(&request)).unwrap();
        assert_eq!(value["n_predict"], 256);
        assert_eq!(value["stream"], true);
        assert_eq!(value["stop"][0], "Question:");
        assert_eq!(value["stop"][1], "\n\n");
    }

    #[test]
    fn test_config_validation() {
        let mut config = LlamaServerConfig::default();
        assert!(config.validate().is_ok());
        config.port = 0;
        assert_eq!(config.validate().unwrap_err().code(), "INVALID_SERVER_PORT");
    }

    fn unused_port() -> u16 {
        TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_missing_binary_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, b"GGUF").unwrap();

        let loader = LlamaServerLoader::new(LlamaServerConfig {
            binary: dir.path().join("no-such-llama-server"),
            port: unused_port(),
            ..Default::default()
        })
        .unwrap();
        let err = loader.load(&model, &ModelConfig::default()).unwrap_err();
        assert_eq!(err.code(), "SERVER_SPAWN_FAILED");
    }

    #[test]
    fn test_occupied_port_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let stale = TcpListener::bind(("127.0.0.1", 0)).unwrap();

        let loader = LlamaServerLoader::new(LlamaServerConfig {
            binary: dir.path().join("no-such-llama-server"),
            port: stale.local_addr().unwrap().port(),
            ..Default::default()
        })
        .unwrap();
        let err = loader.load(&model, &ModelConfig::default()).unwrap_err();
        assert_eq!(err.code(), "PORT_IN_USE");
    }
}
