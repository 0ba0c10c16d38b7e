//! Judge engine: classifies a submission against an expert answer.

use super::verdict::parse_judge_output;
use crate::client::{CompletionRequest, Message, TextGenerator};
use crate::models::{
    CallStage, Config, HalluvalError, JudgeChoice, JudgeVerdict, JudgingConfig, ModelSpec, Result,
    ServiceError,
};
use crate::prompts;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Category assumed when the judge output has no usable choice.
pub const DEFAULT_CHOICE: JudgeChoice = JudgeChoice::D;

/// LLM judge for factual consistency.
pub struct JudgeEngine {
    client: Arc<dyn TextGenerator>,
    model: ModelSpec,
    settings: JudgingConfig,
}

impl JudgeEngine {
    pub fn new(client: Arc<dyn TextGenerator>, model: ModelSpec, settings: JudgingConfig) -> Self {
        Self {
            client,
            model,
            settings,
        }
    }

    /// Judge engine using the `[judge]` model and `[judging]` settings.
    pub fn from_config(client: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(client, config.judge.clone(), config.judging.clone())
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Compare `submission` with `expert` for the given question.
    ///
    /// Unparseable output, whitespace included, is not an error: the verdict
    /// falls back to `DEFAULT_CHOICE` with `defaulted` set. Only an empty
    /// completion fails.
    pub async fn judge(
        &self,
        expert: &str,
        submission: &str,
        context: &str,
        question: &str,
    ) -> Result<JudgeVerdict> {
        let start = Instant::now();
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompts::judge_prompt(
                context, question, expert, submission,
            ))],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| HalluvalError::service(CallStage::Judge(None), e))?;

        if response.content.is_empty() {
            return Err(HalluvalError::service(
                CallStage::Judge(None),
                ServiceError::EmptyCompletion(self.model.id.clone()),
            ));
        }

        let parsed = parse_judge_output(&response.content);
        let verdict = match parsed.choice {
            Some(choice) => JudgeVerdict {
                choice,
                reasoning: parsed.reasoning,
                defaulted: false,
            },
            None => {
                warn!(
                    model = %self.model.id,
                    default = %DEFAULT_CHOICE,
                    output_chars = response.content.len(),
                    "Judge output has no valid choice, defaulting"
                );
                JudgeVerdict {
                    choice: DEFAULT_CHOICE,
                    reasoning: parsed.reasoning,
                    defaulted: true,
                }
            }
        };

        debug!(
            model = %self.model.id,
            choice = %verdict.choice,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Submission judged"
        );

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed text and records every request.
    struct FixedReply {
        reply: std::result::Result<String, fn() -> ServiceError>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FixedReply {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for FixedReply {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ServiceError> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse::text(text.clone())),
                Err(make) => Err(make()),
            }
        }
    }

    fn engine(client: Arc<FixedReply>) -> JudgeEngine {
        JudgeEngine::new(client, ModelSpec::named("judge-model"), JudgingConfig::default())
    }

    #[tokio::test]
    async fn test_judge_parses_choice_and_uses_deterministic_settings() {
        let client = FixedReply::ok("Reasoning: identical facts\nChoice: C");
        let verdict = engine(client.clone())
            .judge("1889", "1889", "The tower opened in 1889.", "When?")
            .await
            .unwrap();

        assert_eq!(verdict.choice, JudgeChoice::C);
        assert_eq!(verdict.reasoning, "identical facts");
        assert!(!verdict.defaulted);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(requests[0].model.id, "judge-model");
        let prompt = requests[0].user_prompt();
        assert!(prompt.contains("[Expert]: 1889"));
        assert!(prompt.contains("[Submission]: 1889"));
    }

    #[tokio::test]
    async fn test_unparseable_output_defaults_to_d() {
        let client = FixedReply::ok("I think they are mostly the same.");
        let verdict = engine(client).judge("a", "b", "c", "q").await.unwrap();
        assert_eq!(verdict.choice, JudgeChoice::D);
        assert_eq!(verdict.reasoning, "");
        assert!(verdict.defaulted);
    }

    #[tokio::test]
    async fn test_whitespace_output_defaults_to_d() {
        let client = FixedReply::ok("  \n ");
        let verdict = engine(client).judge("a", "b", "c", "q").await.unwrap();
        assert_eq!(verdict.choice, JudgeChoice::D);
        assert_eq!(verdict.reasoning, "");
        assert!(verdict.defaulted);
    }

    #[tokio::test]
    async fn test_empty_output_is_service_error() {
        let client = FixedReply::ok("");
        let err = engine(client).judge("a", "b", "c", "q").await.unwrap_err();
        assert!(matches!(
            err,
            HalluvalError::ExternalService {
                stage: CallStage::Judge(None),
                source: ServiceError::EmptyCompletion(_),
            }
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_carries_stage() {
        let client = Arc::new(FixedReply {
            reply: Err(|| ServiceError::AuthenticationFailed),
            requests: Mutex::new(Vec::new()),
        });
        let err = engine(client).judge("a", "b", "c", "q").await.unwrap_err();
        assert!(err.to_string().starts_with("judge call failed"));
        assert!(!err.is_retryable());
    }
}
