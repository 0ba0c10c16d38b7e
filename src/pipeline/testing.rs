//! Scripted text generator shared by pipeline tests.

use crate::client::{CompletionRequest, CompletionResponse, TextGenerator, UsageTotals};
use crate::models::ServiceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Barrier, watch};

type Reply = Box<dyn Fn(&str) -> Result<String, ServiceError> + Send + Sync>;
type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Counts judge calls dropped before they returned.
struct DropCounter<'a>(&'a AtomicUsize);

impl Drop for DropCounter<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) const HALLUCINATED: &str = "It opened in 1925 after a gala attended by 40 kings.";

/// Answers generation and judge requests from closures over the user prompt.
///
/// The default judge replies C when submission and expert are equal, A when the
/// submission is contained in the expert answer and D otherwise.
pub(crate) struct StubBackend {
    hallucination: Reply,
    partial: Reply,
    judge: Reply,
    judge_barrier: Option<Barrier>,
    hold_hallucination_judge: bool,
    judges_returned: watch::Sender<usize>,
    hang_judge: Option<Matcher>,
    pub(crate) judges_dropped: AtomicUsize,
    pub(crate) generation_calls: AtomicUsize,
    pub(crate) judge_calls: AtomicUsize,
}

impl StubBackend {
    pub(crate) fn new() -> Self {
        Self {
            hallucination: Box::new(|_| Ok(HALLUCINATED.to_string())),
            partial: Box::new(|prompt| {
                // First word of the full answer keeps the reply a strict subset.
                let full = prompt.rsplit("Full Answer: ").next().unwrap_or_default();
                Ok(full.split_whitespace().next().unwrap_or_default().to_string())
            }),
            judge: Box::new(|prompt| Ok(compare(prompt))),
            judge_barrier: None,
            hold_hallucination_judge: false,
            judges_returned: watch::Sender::new(0),
            hang_judge: None,
            judges_dropped: AtomicUsize::new(0),
            generation_calls: AtomicUsize::new(0),
            judge_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_hallucination(
        mut self,
        reply: impl Fn(&str) -> Result<String, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        self.hallucination = Box::new(reply);
        self
    }

    pub(crate) fn with_judge(
        mut self,
        reply: impl Fn(&str) -> Result<String, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        self.judge = Box::new(reply);
        self
    }

    /// Hold every judge call until `parties` judge calls are in flight.
    pub(crate) fn with_judge_barrier(mut self, parties: usize) -> Self {
        self.judge_barrier = Some(Barrier::new(parties));
        self
    }

    /// Let the hallucination judge call return only after the other two have.
    pub(crate) fn with_hallucination_judge_last(mut self) -> Self {
        self.hold_hallucination_judge = true;
        self
    }

    /// Judge calls whose prompt matches never return.
    pub(crate) fn with_hanging_judge(
        mut self,
        matches: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.hang_judge = Some(Box::new(matches));
        self
    }

    fn calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst) + self.judge_calls.load(Ordering::SeqCst)
    }
}

/// Field of the judge prompt following `[label]: `, up to the line end.
pub(crate) fn judge_field<'a>(prompt: &'a str, label: &str) -> &'a str {
    let marker = format!("[{label}]: ");
    prompt
        .split_once(&marker)
        .and_then(|(_, rest)| rest.lines().next())
        .unwrap_or_default()
}

fn compare(prompt: &str) -> String {
    let expert = judge_field(prompt, "Expert");
    let submission = judge_field(prompt, "Submission");
    if submission == expert {
        "Reasoning: Both answers state the same facts.\nChoice: C".to_string()
    } else if expert.contains(submission) {
        "Reasoning: The submission omits details.\nChoice: A".to_string()
    } else {
        "Reasoning: The dates conflict.\nChoice: D".to_string()
    }
}

#[async_trait]
impl TextGenerator for StubBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        let prompt = request.user_prompt();

        let content = if request.system_prompt().is_some() {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            (self.partial)(prompt)?
        } else if prompt.contains("hallucinating assistant") {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            (self.hallucination)(prompt)?
        } else {
            self.judge_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_judge.as_ref().is_some_and(|hangs| hangs(prompt)) {
                let _dropped = DropCounter(&self.judges_dropped);
                std::future::pending::<()>().await;
            }
            if let Some(barrier) = &self.judge_barrier {
                barrier.wait().await;
            }
            if self.hold_hallucination_judge && judge_field(prompt, "Submission") == HALLUCINATED {
                let mut returned = self.judges_returned.subscribe();
                returned
                    .wait_for(|n| *n >= 2)
                    .await
                    .map_err(|_| ServiceError::InvalidResponse("judge gate closed".into()))?;
            }
            let reply = (self.judge)(prompt);
            self.judges_returned.send_modify(|n| *n += 1);
            reply?
        };

        Ok(CompletionResponse {
            input_tokens: 10,
            output_tokens: 5,
            cost_usd: 0.001,
            ..CompletionResponse::text(content)
        })
    }

    fn usage(&self) -> UsageTotals {
        let calls = self.calls() as u64;
        UsageTotals {
            input_tokens: calls * 10,
            output_tokens: calls * 5,
            cost_usd: calls as f64 * 0.001,
        }
    }
}
