use super::{Backend, BackendError, BackendSettings, Completion, RateLimiter, run_timed, with_retry};
use crate::config::ModelConfig;
use crate::models::{GenerationOptions, GenerationResult};
use crate::pricing::ModelPrice;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_API_KEY_VAR: &str = "GOOGLE_API_KEY";

/// Google Gemini `generateContent` backend
pub struct GeminiBackend {
    model: String,
    api_endpoint: String,
    env_var_api_key: String,
    settings: BackendSettings,
    price: ModelPrice,
    limiter: RateLimiter,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GeminiBackend {
    pub fn new(config: &ModelConfig, settings: &BackendSettings, price: ModelPrice) -> Self {
        Self {
            model: config.name.clone(),
            api_endpoint: config.endpoint().to_string(),
            env_var_api_key: config.api_key_var().unwrap_or(DEFAULT_API_KEY_VAR).to_string(),
            settings: settings.clone(),
            price,
            limiter: RateLimiter::new(config.rate_limit_rps),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_endpoint, self.model)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, BackendError> {
        let api_key = std::env::var(&self.env_var_api_key)
            .map_err(|_| BackendError::MissingApiKey(self.env_var_api_key.clone()))?;

        let request = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system_prompt }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: user_prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            },
        };

        let response = with_retry(&self.settings.retry, || self.send(&api_key, &request)).await?;
        extract_completion(response)
    }

    async fn send(
        &self,
        api_key: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, BackendError> {
        let timeout = self.settings.timeout;
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
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
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))
    }
}

fn extract_completion(response: GenerateContentResponse) -> Result<Completion, BackendError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::MalformedResponse("response has no candidates".to_string()))?;

    let content = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|content| !content.is_empty())
        .ok_or_else(|| BackendError::MalformedResponse("candidate has no text content".to_string()))?;

    let (input_tokens, output_tokens) = response
        .usage_metadata
        .map(|usage| (usage.prompt_token_count, usage.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(Completion {
        content,
        input_tokens,
        output_tokens,
    })
}

#[async_trait]
impl Backend for GeminiBackend {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RetryPolicy;
    use crate::config::Provider;
    use mockito::Matcher;

    const KEY_VAR: &str = "RESTAURANT_EVAL_TEST_GEMINI_KEY";

    fn create_backend(endpoint: &str) -> GeminiBackend {
        let config = ModelConfig {
            name: "gemini-2.0-flash".to_string(),
            provider: Provider::Gemini,
            api_endpoint: Some(endpoint.to_string()),
            env_var_api_key: Some(KEY_VAR.to_string()),
            rate_limit_rps: 0.0,
        };
        let settings = BackendSettings {
            retry: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            ..BackendSettings::default()
        };
        unsafe {
            std::env::set_var(KEY_VAR, "test-key");
        }
        GeminiBackend::new(&config, &settings, ModelPrice { input: 0.1, output: 0.4 })
    }

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 1000}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"score\": "}, {"text": "9}"}]}}],
                    "usageMetadata": {"promptTokenCount": 2000, "candidatesTokenCount": 1000, "totalTokenCount": 3000}
                }"#,
            )
            .create_async()
            .await;

        let backend = create_backend(&server.url());
        let result = backend
            .generate("system", "Persona: {}", &GenerationOptions::default())
            .await;

        mock.assert_async().await;
        assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
        assert_eq!(result.content, r#"{"score": 9}"#);
        assert_eq!(result.input_token_count, 2000);
        assert_eq!(result.output_token_count, 1000);
        assert!((result.cost_usd - 0.0006).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_generate_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(400)
            .with_body(r#"{"error": {"message": "API key not valid"}}"#)
            .create_async()
            .await;

        let backend = create_backend(&server.url());
        let result = backend.generate("system", "user", &GenerationOptions::default()).await;

        let error = result.error.unwrap();
        assert!(error.contains("HTTP 400"));
        assert!(error.contains("API key not valid"));
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn test_generate_missing_usage_counts_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "안녕하세요"}]}}]}"#)
            .create_async()
            .await;

        let backend = create_backend(&server.url());
        let result = backend.generate("system", "user", &GenerationOptions::default()).await;

        assert!(result.error.is_none());
        assert_eq!(result.content, "안녕하세요");
        assert_eq!(result.input_token_count, 0);
        assert_eq!(result.output_token_count, 0);
        assert_eq!(result.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_candidate_without_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates": [{"finishReason": "SAFETY"}], "usageMetadata": {"promptTokenCount": 12}}"#)
            .create_async()
            .await;

        let backend = create_backend(&server.url());
        let result = backend.generate("system", "user", &GenerationOptions::default()).await;

        assert!(result.content.is_empty());
        assert_eq!(result.cost_usd, 0.0);
        let error = result.error.expect("content-less reply must report an error");
        assert!(error.starts_with("Malformed provider response"), "got: {}", error);
    }

    #[test]
    fn test_no_candidates_is_malformed() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        let err = extract_completion(response).unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }
}
