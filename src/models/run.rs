//! Batch output records and run statistics.

use super::{VariantBatch, VariantKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scored example as written to the output JSONL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    /// Unique identifier for this record
    pub id: String,

    /// Zero-based position of the example in the input file
    pub example_index: usize,

    /// When scoring finished
    pub completed_at: DateTime<Utc>,

    /// Scored variants, `[original, hallucination, partial]`
    pub variants: VariantBatch,
}

/// Per-kind score accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindStats {
    pub scored: usize,
    pub score_sum: f64,
    pub mean_score: f64,
}

/// Statistics for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Examples read from the input
    pub total_examples: usize,

    /// Examples whose three variants were all scored
    pub total_completed: usize,

    /// Examples that failed as a whole
    pub total_failed: usize,

    /// Judge outputs with no usable choice (defaulted to D)
    pub judge_parse_defaults: usize,

    pub original: KindStats,
    pub hallucination: KindStats,
    pub partial: KindStats,

    /// Prompt tokens across all calls
    pub input_tokens: u64,

    /// Completion tokens across all calls
    pub output_tokens: u64,

    /// Estimated cost (USD)
    pub cost_usd: f64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Completed examples per hour
    pub throughput_per_hour: f64,
}

impl RunStats {
    /// Fold a completed batch into the totals.
    pub fn record_batch(&mut self, batch: &VariantBatch) {
        self.total_completed += 1;
        for variant in batch {
            let Some(score) = variant.score() else {
                continue;
            };
            if score.parse_defaulted() {
                self.judge_parse_defaults += 1;
            }
            let kind = self.kind_mut(variant.kind);
            kind.scored += 1;
            kind.score_sum += score.score();
        }
    }

    pub fn kind(&self, kind: VariantKind) -> &KindStats {
        match kind {
            VariantKind::Original => &self.original,
            VariantKind::Hallucination => &self.hallucination,
            VariantKind::Partial => &self.partial,
        }
    }

    fn kind_mut(&mut self, kind: VariantKind) -> &mut KindStats {
        match kind {
            VariantKind::Original => &mut self.original,
            VariantKind::Hallucination => &mut self.hallucination,
            VariantKind::Partial => &mut self.partial,
        }
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        for kind in VariantKind::ALL {
            let stats = self.kind_mut(kind);
            if stats.scored > 0 {
                stats.mean_score = stats.score_sum / stats.scored as f64;
            }
        }
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.total_completed as f64 / self.runtime_secs * 3600.0;
        }
    }
}
