//! Per-example pipeline: generate three variants, then judge them concurrently.
//!
//! Pipeline flow:
//! BaseExample → GenerationEngine → [original, hallucination, partial] → JudgeEngine ×3 → scored batch

use crate::client::TextGenerator;
use crate::engine::{GenerationEngine, JudgeEngine};
use crate::models::{
    BaseExample, Config, HallucinationExample, HalluvalError, JudgeScore, JudgeVerdict, Result,
    VariantBatch, VariantKind,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Runs generation and scoring for one example at a time.
pub struct HallucinationPipeline {
    generator: GenerationEngine,
    judge: JudgeEngine,
}

impl HallucinationPipeline {
    /// Create a pipeline whose engines share one text generator.
    pub fn new(client: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::with_engines(
            GenerationEngine::from_config(Arc::clone(&client), config),
            JudgeEngine::from_config(client, config),
        )
    }

    pub fn with_engines(generator: GenerationEngine, judge: JudgeEngine) -> Self {
        Self { generator, judge }
    }

    /// Generate and score all three variants of `example`.
    ///
    /// Judge calls run concurrently. The first failure cancels the calls still in
    /// flight and fails the run; no partially scored batch is ever returned.
    pub async fn run(&self, example: &BaseExample) -> Result<VariantBatch> {
        let start = Instant::now();
        example.validate()?;

        let mut batch = self.generator.generate_variants(example).await?;

        let (original, hallucination, partial) = tokio::try_join!(
            self.score_variant(batch.get(VariantKind::Original)),
            self.score_variant(batch.get(VariantKind::Hallucination)),
            self.score_variant(batch.get(VariantKind::Partial)),
        )?;

        let verdicts = [original, hallucination, partial];
        for (variant, verdict) in batch.variants_mut().iter_mut().zip(&verdicts) {
            variant.attach_score(JudgeScore::from_verdict(verdict))?;
        }

        if !batch.is_fully_scored() {
            return Err(HalluvalError::Internal(
                "batch left with unscored variants".to_string(),
            ));
        }

        debug!(
            question = %example.question,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Example scored"
        );

        Ok(batch)
    }

    async fn score_variant(&self, variant: &HallucinationExample) -> Result<JudgeVerdict> {
        self.judge
            .judge(
                &variant.base.correct_answer,
                &variant.generated_answer,
                &variant.base.context,
                &variant.base.question,
            )
            .await
            .map_err(|e| e.for_variant(variant.kind))
    }
}
