use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Falls back to the model's configured default when `None`.
    pub model: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub temperature: Option<f32>,
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatTurn::user(prompt)],
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub latency: Duration,
    pub usage: Option<TokenUsage>,
}

/// Text generation seam shared by the judge, the simulator and the RAG answerer.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn default_model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, AppError>;
}

pub struct OpenAiLanguageModel {
    client: Arc<Client<OpenAIConfig>>,
    default_model: String,
}

impl OpenAiLanguageModel {
    pub fn new(client: Arc<Client<OpenAIConfig>>, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let messages = request
            .turns
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(request.model.as_deref().unwrap_or(&self.default_model))
            .messages(messages);

        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }
        if request.json_output {
            builder.response_format(ResponseFormat::JsonObject);
        }

        Ok(builder.build()?)
    }
}

fn to_openai_message(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage, AppError> {
    let message: ChatCompletionRequestMessage = match turn.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.content.as_str())
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.as_str())
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.as_str())
            .build()?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, AppError> {
        let openai_request = self.build_request(&request)?;
        let model = openai_request.model.clone();
        let retry_strategy = ExponentialBackoff::from_millis(200).map(jitter).take(3);

        let started = Instant::now();
        let response = Retry::spawn(retry_strategy, || {
            let attempt = openai_request.clone();
            async move {
                self.client.chat().create(attempt).await.inspect_err(|e| {
                    warn!(error = %e, "Chat completion attempt failed");
                })
            }
        })
        .await?;
        let latency = started.elapsed();

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))?;

        let usage = response.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });

        debug!(
            model = %model,
            latency_ms = latency.as_millis(),
            response_chars = text.len(),
            "Chat completion finished"
        );

        Ok(Completion {
            text,
            model,
            latency,
            usage,
        })
    }
}

/// Parses the first `{` .. last `}` span of an LLM response as JSON.
pub fn extract_json_object<T: DeserializeOwned>(text: &str) -> Result<T, AppError> {
    let start = text.find('{');
    let end = text.rfind('}');

    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            let slice = text.get(start..=end).ok_or_else(|| {
                AppError::LLMParsing("JSON object boundaries are not valid UTF-8 offsets".into())
            })?;
            serde_json::from_str(slice)
                .map_err(|e| AppError::LLMParsing(format!("Invalid JSON in LLM response: {e}")))
        }
        _ => Err(AppError::LLMParsing(
            "No JSON object found in LLM response".into(),
        )),
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedLanguageModel;

#[cfg(any(test, feature = "test-utils"))]
mod scripted {
    use std::{collections::VecDeque, sync::Mutex, time::Duration};

    use async_trait::async_trait;

    use super::{Completion, CompletionRequest, LanguageModel};
    use crate::error::AppError;

    /// Returns queued responses in order and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedLanguageModel {
        responses: Mutex<VecDeque<Result<String, String>>>,
        fallback: Option<String>,
        delay: Option<Duration>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLanguageModel {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
                ..Self::default()
            }
        }

        /// Response used once the queue is drained.
        pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
            self.fallback = Some(response.into());
            self
        }

        /// Sleeps this long before answering, like a slow provider.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn push_error(&self, message: impl Into<String>) {
            if let Ok(mut queue) = self.responses.lock() {
                queue.push_back(Err(message.into()));
            }
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests
                .lock()
                .map(|requests| requests.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLanguageModel {
        fn default_model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<Completion, AppError> {
            let model = request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model().to_string());
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let next = self
                .responses
                .lock()
                .map_err(|_| AppError::InternalError("scripted model poisoned".into()))?
                .pop_front();

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(message)) => return Err(AppError::Processing(message)),
                None => self.fallback.clone().ok_or_else(|| {
                    AppError::InternalError("scripted model ran out of responses".into())
                })?,
            };

            Ok(Completion {
                text,
                model,
                latency: Duration::from_millis(5),
                usage: None,
            })
        }
    }
}
