//! The model provider seam.
//!
//! Agent, router, and evaluator blocks all talk to an external model through
//! this narrow interface. Wire formats, auth, and streaming transports are
//! the provider's problem — the engine only sees [`AgentResponse`] values
//! and opaque streaming envelopes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;

/// One completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    /// Model identifier, provider-interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// System prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tool definitions, opaque to the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt-side tokens.
    pub prompt: u32,
    /// Completion-side tokens.
    pub completion: u32,
    /// Total tokens billed.
    pub total: u32,
}

/// A tool call the model requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Tool arguments as the model produced them.
    pub arguments: Value,
}

/// One completed model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// The text content.
    pub content: String,
    /// The model that answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token accounting.
    #[serde(default)]
    pub tokens: TokenUsage,
    /// Tool calls, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Provider-side wall clock in milliseconds.
    #[serde(default)]
    pub provider_timing_ms: u64,
    /// Cost in the provider's billing currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl AgentResponse {
    /// The response as a block output value.
    #[must_use]
    pub fn to_output(&self) -> Value {
        // Serialization of this shape cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A streaming completion in flight.
///
/// The engine propagates this envelope without re-encoding: `execution`
/// becomes the block's recorded output, `stream` goes to whoever the
/// embedder registered as the stream sink.
pub struct StreamingExecution {
    /// Content chunks as the provider emits them.
    pub stream: BoxStream<'static, Result<String, HandlerError>>,
    /// The execution metadata recorded as the block output.
    pub execution: Value,
}

impl std::fmt::Debug for StreamingExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingExecution")
            .field("execution", &self.execution)
            .finish_non_exhaustive()
    }
}

/// The external model provider.
#[async_trait]
pub trait AgentProvider: Send + Sync + 'static {
    /// Run one completion to the end.
    async fn complete(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> Result<AgentResponse, HandlerError>;

    /// Start a streaming completion.
    ///
    /// The default implementation completes eagerly and wraps the result in
    /// a single-chunk stream, so providers only implement this when they
    /// have a real transport.
    async fn stream(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> Result<StreamingExecution, HandlerError> {
        let response = self.complete(request, cancel).await?;
        let execution = response.to_output();
        let content = response.content;
        Ok(StreamingExecution {
            stream: Box::pin(futures::stream::once(async move { Ok(content) })),
            execution,
        })
    }
}

/// The provider installed when the embedder configured none.
///
/// Fails every call with a clear message instead of panicking deep inside a
/// run.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

#[async_trait]
impl AgentProvider for UnconfiguredProvider {
    async fn complete(
        &self,
        _request: AgentRequest,
        _cancel: CancellationToken,
    ) -> Result<AgentResponse, HandlerError> {
        Err(HandlerError::Provider(
            "no agent provider configured for this engine".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct CannedProvider;

    #[async_trait]
    impl AgentProvider for CannedProvider {
        async fn complete(
            &self,
            request: AgentRequest,
            _cancel: CancellationToken,
        ) -> Result<AgentResponse, HandlerError> {
            Ok(AgentResponse {
                content: format!("echo: {}", request.prompt),
                model: request.model,
                tokens: TokenUsage {
                    prompt: 3,
                    completion: 5,
                    total: 8,
                },
                ..AgentResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let provider = CannedProvider;
        let request = AgentRequest {
            prompt: "hi".into(),
            ..AgentRequest::default()
        };
        let mut streaming = provider
            .stream(request, CancellationToken::new())
            .await
            .unwrap();

        let chunk = streaming.stream.next().await.unwrap().unwrap();
        assert_eq!(chunk, "echo: hi");
        assert!(streaming.stream.next().await.is_none());
        assert_eq!(streaming.execution["content"], "echo: hi");
        assert_eq!(streaming.execution["tokens"]["total"], 8);
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_cleanly() {
        let err = UnconfiguredProvider
            .complete(AgentRequest::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Provider(_)));
    }

    #[test]
    fn response_output_shape() {
        let response = AgentResponse {
            content: "hello".into(),
            model: Some("m1".into()),
            tokens: TokenUsage {
                prompt: 1,
                completion: 2,
                total: 3,
            },
            tool_calls: vec![],
            provider_timing_ms: 40,
            cost: Some(0.002),
        };
        let output = response.to_output();
        assert_eq!(output["content"], "hello");
        assert_eq!(output["tokens"]["total"], 3);
        assert_eq!(output["providerTimingMs"], 40);
    }
}
