use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::Credentials,
    error::{QuizError, Result},
    provider::Provider,
    retry::RetryPolicy,
};

/// One schema-constrained generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub schema_name: &'static str,
    pub schema: Value,
}

/// A language model that answers with JSON conforming to a given schema.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value>;

    fn model_name(&self) -> &str;
}

/// Generate and deserialize in one step. Output that does not fit `T` is a
/// `StructuredOutput` error.
pub async fn generate_structured<T: DeserializeOwned>(
    service: &dyn GenerativeService,
    request: &GenerationRequest,
) -> Result<T> {
    let value = service.generate(request).await?;
    serde_json::from_value(value).map_err(|e| QuizError::StructuredOutput {
        schema: request.schema_name.to_string(),
        reason: e.to_string(),
    })
}

/// Client for OpenAI-compatible `/chat/completions` endpoints using
/// `json_schema` response formatting.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    credentials: Credentials,
    url: String,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    /// `timeout` bounds each HTTP attempt, connect to last body byte. An
    /// attempt that runs out is a retryable `Timeout`.
    pub fn new(credentials: Credentials, retry: RetryPolicy, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let url = credentials.chat_url();
        Ok(Self {
            http,
            credentials,
            url,
            retry,
        })
    }

    fn body(&self, request: &GenerationRequest) -> Value {
        serde_json::json!({
            "model": self.credentials.model,
            "messages": [
                {
                    "role": "system",
                    "content": request.system,
                },
                {
                    "role": "user",
                    "content": request.user,
                },
            ],
            "temperature": 0,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                },
            },
        })
    }

    async fn send_once(&self, body: &Value) -> Result<Value> {
        let mut builder = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json");
        builder = match self.credentials.provider {
            Provider::Azure => builder.header("api-key", &self.credentials.api_key),
            _ => builder.header(
                "Authorization",
                format!("Bearer {}", self.credentials.api_key),
            ),
        };
        if let Some(org) = &self.credentials.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder.json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                self.credentials.provider,
                message,
            ));
        }

        Ok(response.json::<Value>().await?)
    }
}

fn classify_status(status: StatusCode, provider: Provider, message: String) -> QuizError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => QuizError::Authentication {
            provider: provider.name().to_string(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => QuizError::RateLimited { message },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            QuizError::Timeout { message }
        }
        s if s.is_server_error() => QuizError::Transport {
            message: format!("{}: {}", s, message),
        },
        s => QuizError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

/// Pull the JSON document out of a chat-completions response.
fn extract_content(response: &Value, schema: &str) -> Result<Value> {
    let message = &response["choices"][0]["message"];
    let structured = |reason: String| QuizError::StructuredOutput {
        schema: schema.to_string(),
        reason,
    };

    if let Some(refusal) = message["refusal"].as_str() {
        return Err(structured(format!("model refused: {refusal}")));
    }

    let content = message["content"]
        .as_str()
        .ok_or_else(|| structured(format!("Invalid API response: {:?}", response)))?;

    serde_json::from_str(content).map_err(|e| structured(e.to_string()))
}

#[async_trait]
impl GenerativeService for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        let body = self.body(request);
        debug!(
            url = %self.url,
            schema = request.schema_name,
            "sending chat completion request"
        );
        let response = self
            .retry
            .run(request.schema_name, || self.send_once(&body))
            .await?;
        extract_content(&response, request.schema_name)
    }

    fn model_name(&self) -> &str {
        &self.credentials.model
    }
}
