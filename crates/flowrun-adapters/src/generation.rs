use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use flowrun_core::error::{FlowError, Result};
use flowrun_core::traits::GenerationService;
use flowrun_core::types::{Generation, GenerationFailure, GenerationRequest, Usage};

/// Generation service backed by an HTTP endpoint.
///
/// Each call POSTs the node's role, prompt, and provider as JSON with the
/// provider secret as a bearer token. The configured timeout bounds the
/// whole request.
pub struct HttpGenerationService {
    http: Client,
    endpoint: String,
}

impl HttpGenerationService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlowError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    role: &'a str,
    prompt: &'a str,
    provider: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cost: f64,
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(default)]
    usage: Option<Usage>,
}

/// Decode a 2xx response body.
fn decode_success(body: &str) -> std::result::Result<Generation, GenerationFailure> {
    let reply: GenerateReply = serde_json::from_str(body)
        .map_err(|e| GenerationFailure::new(format!("invalid response: {}", e)))?;
    Ok(Generation {
        text: reply.text,
        usage: Usage::new(reply.input_tokens, reply.output_tokens, reply.cost),
    })
}

/// Build the failure for a non-2xx response. A JSON body reporting `usage`
/// keeps it.
fn decode_failure(status: u16, body: &str) -> GenerationFailure {
    let usage = serde_json::from_str::<ErrorReply>(body)
        .ok()
        .and_then(|r| r.usage)
        .unwrap_or_default();
    GenerationFailure::new(format!("HTTP {}: {}", status, body.trim())).with_usage(usage)
}

impl GenerationService for HttpGenerationService {
    fn execute(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, std::result::Result<Generation, GenerationFailure>> {
        Box::pin(async move {
            let body = GenerateBody {
                role: &request.role,
                prompt: &request.prompt,
                provider: &request.provider,
            };

            let response = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&request.secret)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    let message = if e.is_timeout() {
                        format!("request timed out: {}", e)
                    } else {
                        format!("request failed: {}", e)
                    };
                    GenerationFailure::new(message)
                })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| GenerationFailure::new(format!("reading response: {}", e)))?;

            if !status.is_success() {
                warn!(provider = %request.provider, status = status.as_u16(), "Generation request rejected");
                return Err(decode_failure(status.as_u16(), &text));
            }

            let generation = decode_success(&text)?;
            debug!(
                provider = %request.provider,
                input_tokens = generation.usage.input_tokens,
                output_tokens = generation.usage.output_tokens,
                "Generation complete"
            );
            Ok(generation)
        })
    }
}
