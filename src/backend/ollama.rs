use super::{Backend, BackendError, BackendSettings, Completion, RateLimiter, run_timed, with_retry};
use crate::config::ModelConfig;
use crate::models::{GenerationOptions, GenerationResult};
use crate::pricing::ModelPrice;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Locally hosted model behind an Ollama server. No API key is involved.
pub struct OllamaBackend {
    model: String,
    api_endpoint: String,
    settings: BackendSettings,
    price: ModelPrice,
    limiter: RateLimiter,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaBackend {
    pub fn new(config: &ModelConfig, settings: &BackendSettings, price: ModelPrice) -> Self {
        Self {
            model: config.name.clone(),
            api_endpoint: config.endpoint().to_string(),
            settings: settings.clone(),
            price,
            limiter: RateLimiter::new(config.rate_limit_rps),
            client: reqwest::Client::new(),
        }
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: options.temperature,
                num_predict: options.max_output_tokens,
            },
        };

        let response = with_retry(&self.settings.retry, || self.send(&request)).await?;

        let content = response
            .message
            .map(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| BackendError::MalformedResponse("response has no message content".to_string()))?;

        Ok(Completion {
            content,
            input_tokens: response.prompt_eval_count,
            output_tokens: response.eval_count,
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<ChatResponse, BackendError> {
        let timeout = self.settings.timeout;
        let response = self
            .client
            .post(format!("{}/api/chat", self.api_endpoint))
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationResult {
        self.limiter.acquire().await;
        run_timed(
            &self.model,
            self.price,
            self.complete(system_prompt, user_prompt, options),
        )
        .await
    }
}
