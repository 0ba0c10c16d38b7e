//! Generation engine: produces the three answer variants of an example.

use crate::client::{CompletionRequest, Message, TextGenerator};
use crate::models::{
    BaseExample, CallStage, Config, GenerationConfig, HallucinationExample, HalluvalError,
    ModelSpec, Result, VariantBatch, VariantKind,
};
use crate::prompts;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Generates original, hallucinated and partial answers.
pub struct GenerationEngine {
    /// Shared text generator
    client: Arc<dyn TextGenerator>,
    /// Model used for both generated variants
    model: ModelSpec,
    /// Sampling settings
    settings: GenerationConfig,
}

impl GenerationEngine {
    pub fn new(
        client: Arc<dyn TextGenerator>,
        model: ModelSpec,
        settings: GenerationConfig,
    ) -> Self {
        Self {
            client,
            model,
            settings,
        }
    }

    /// Generation engine using the `[generator]` model and `[generation]` settings.
    pub fn from_config(client: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(client, config.generator.clone(), config.generation.clone())
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Produce the unscored variants in `[original, hallucination, partial]` order.
    ///
    /// The original answer is copied from the example. The other two are generated
    /// one after another; the first failure aborts.
    pub async fn generate_variants(&self, example: &BaseExample) -> Result<VariantBatch> {
        let original = HallucinationExample::unscored(
            example.clone(),
            VariantKind::Original,
            example.correct_answer.clone(),
        );

        let hallucinated = self
            .generate(
                VariantKind::Hallucination,
                vec![Message::user(prompts::hallucination_prompt(example))],
                self.settings.hallucination_temperature,
            )
            .await?;

        let partial = self
            .generate(
                VariantKind::Partial,
                vec![
                    Message::system(prompts::PARTIAL_SYSTEM_PROMPT),
                    Message::user(prompts::partial_prompt(example)),
                ],
                self.settings.partial_temperature,
            )
            .await?;

        VariantBatch::new(
            original,
            HallucinationExample::unscored(example.clone(), VariantKind::Hallucination, hallucinated),
            HallucinationExample::unscored(example.clone(), VariantKind::Partial, partial),
        )
    }

    async fn generate(
        &self,
        kind: VariantKind,
        messages: Vec<Message>,
        temperature: f64,
    ) -> Result<String> {
        let start = Instant::now();
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| HalluvalError::service(CallStage::Generation(kind), e))?;

        if response.content.trim().is_empty() {
            return Err(HalluvalError::GenerationFailed { variant: kind });
        }

        debug!(
            variant = %kind,
            model = %self.model.id,
            output_tokens = response.output_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Variant generated"
        );

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionResponse;
    use crate::models::ServiceError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued replies in order and records requests.
    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<String, ServiceError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<String, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ServiceError> {
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(CompletionResponse::text(text)),
                Some(Err(e)) => Err(e),
                None => Err(ServiceError::InvalidResponse("no scripted reply".into())),
            }
        }
    }

    fn example() -> BaseExample {
        BaseExample::new(
            "The Eiffel Tower opened in 1889 for the World's Fair.",
            "When did the Eiffel Tower open?",
            "It opened in 1889.",
        )
    }

    fn engine(client: Arc<Scripted>) -> GenerationEngine {
        GenerationEngine::new(client, ModelSpec::named("gen-model"), GenerationConfig::default())
    }

    #[tokio::test]
    async fn test_generates_three_variants_in_order() {
        let client = Scripted::new(vec![
            Ok("It opened in 1925 with a golden ribbon ceremony.".into()),
            Ok("It opened in the 19th century.".into()),
        ]);
        let batch = engine(client.clone())
            .generate_variants(&example())
            .await
            .unwrap();

        let kinds: Vec<_> = batch.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, VariantKind::ALL.to_vec());
        assert_eq!(
            batch.get(VariantKind::Original).generated_answer,
            "It opened in 1889."
        );
        assert_eq!(
            batch.get(VariantKind::Hallucination).generated_answer,
            "It opened in 1925 with a golden ribbon ceremony."
        );
        assert_eq!(
            batch.get(VariantKind::Partial).generated_answer,
            "It opened in the 19th century."
        );
        assert!(batch.iter().all(|v| v.base == example() && !v.is_scored()));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);

        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].temperature, 1.0);
        assert_eq!(requests[0].max_tokens, 200);
        assert!(requests[0].user_prompt().contains("hallucinating assistant"));

        assert_eq!(requests[1].system_prompt(), Some(prompts::PARTIAL_SYSTEM_PROMPT));
        assert_eq!(requests[1].temperature, 0.7);
        assert!(requests[1].user_prompt().ends_with("Full Answer: It opened in 1889."));
    }

    #[tokio::test]
    async fn test_empty_hallucination_fails_without_partial_call() {
        let client = Scripted::new(vec![Ok("  \n\t".into()), Ok("unused".into())]);
        let err = engine(client.clone())
            .generate_variants(&example())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HalluvalError::GenerationFailed {
                variant: VariantKind::Hallucination
            }
        ));
        assert_eq!(client.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_partial_fails() {
        let client = Scripted::new(vec![Ok("Made up.".into()), Ok(String::new())]);
        let err = engine(client).generate_variants(&example()).await.unwrap_err();
        assert_eq!(err.variant(), Some(VariantKind::Partial));
    }

    #[tokio::test]
    async fn test_service_error_tagged_with_variant() {
        let client = Scripted::new(vec![Err(ServiceError::RateLimited {
            retry_after_secs: 2.0,
        })]);
        let err = engine(client).generate_variants(&example()).await.unwrap_err();

        assert!(matches!(
            err,
            HalluvalError::ExternalService {
                stage: CallStage::Generation(VariantKind::Hallucination),
                ..
            }
        ));
        assert!(err.is_retryable());
    }
}
