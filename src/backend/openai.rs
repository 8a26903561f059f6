use super::{Backend, BackendError, BackendSettings, Completion, RateLimiter, run_timed, with_retry};
use crate::config::ModelConfig;
use crate::models::{GenerationOptions, GenerationResult};
use crate::pricing::ModelPrice;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;

const DEFAULT_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Chat-completions backend for OpenAI and compatible endpoints
pub struct OpenAiBackend {
    model: String,
    api_endpoint: String,
    env_var_api_key: String,
    settings: BackendSettings,
    price: ModelPrice,
    limiter: RateLimiter,
}

impl OpenAiBackend {
    pub fn new(config: &ModelConfig, settings: &BackendSettings, price: ModelPrice) -> Self {
        Self {
            model: config.name.clone(),
            api_endpoint: config.endpoint().to_string(),
            env_var_api_key: config.api_key_var().unwrap_or(DEFAULT_API_KEY_VAR).to_string(),
            settings: settings.clone(),
            price,
            limiter: RateLimiter::new(config.rate_limit_rps),
        }
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, BackendError> {
        let client = self.create_client()?;
        let request = self.build_request(system_prompt, user_prompt, options)?;
        let response = with_retry(&self.settings.retry, || {
            self.execute_request(&client, request.clone())
        })
        .await?;

        Self::extract_completion(response)
    }

    /// Create the OpenAI client; the key is read at call time
    fn create_client(&self) -> Result<Client<OpenAIConfig>, BackendError> {
        let api_key = std::env::var(&self.env_var_api_key)
            .map_err(|_| BackendError::MissingApiKey(self.env_var_api_key.clone()))?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&self.api_endpoint);

        Ok(Client::with_config(openai_config))
    }

    /// Build the chat completion request
    fn build_request(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<CreateChatCompletionRequest, BackendError> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt.to_string())
            .build()
            .map_err(|e| BackendError::Provider(format!("Failed to build system message: {}", e)))?
            .into();

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt.to_string())
            .build()
            .map_err(|e| BackendError::Provider(format!("Failed to build user message: {}", e)))?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([system_message, user_message])
            .temperature(options.temperature)
            .max_tokens(options.max_output_tokens)
            .build()
            .map_err(|e| BackendError::Provider(format!("Failed to build chat completion request: {}", e)))
    }

    /// Execute one attempt, bounded by the configured timeout
    async fn execute_request(
        &self,
        client: &Client<OpenAIConfig>,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, BackendError> {
        match tokio::time::timeout(self.settings.timeout, client.chat().create(request)).await {
            Ok(result) => result.map_err(map_openai_error),
            Err(_) => Err(BackendError::Timeout(self.settings.timeout.as_secs())),
        }
    }

    /// Pull text and usage out of the response; missing usage counts as zero
    fn extract_completion(response: CreateChatCompletionResponse) -> Result<Completion, BackendError> {
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| BackendError::MalformedResponse("response has no message content".to_string()))?;

        let (input_tokens, output_tokens) = match response.usage {
            Some(usage) => (usage.prompt_tokens as u64, usage.completion_tokens as u64),
            None => (0, 0),
        };

        Ok(Completion {
            content,
            input_tokens,
            output_tokens,
        })
    }
}

fn map_openai_error(err: OpenAIError) -> BackendError {
    match err {
        OpenAIError::Reqwest(e) => BackendError::Connection(e.to_string()),
        OpenAIError::JSONDeserialize(e) => BackendError::MalformedResponse(e.to_string()),
        other => BackendError::Provider(other.to_string()),
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
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
