//! Batch runner over many examples.
//!
//! Pipeline flow:
//! JSONL / JSON array → BaseExample × N → HallucinationPipeline (bounded) → BatchRecord JSONL

use super::HallucinationPipeline;
use crate::client::TextGenerator;
use crate::models::{
    BaseExample, BatchRecord, Config, HalluvalError, OutputConfig, PipelineConfig, Result,
    RunStats, VariantBatch,
};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{info, warn};
use uuid::Uuid;

/// Runs the pipeline over a list of examples and writes scored records.
pub struct BatchRunner {
    pipeline: Arc<HallucinationPipeline>,
    client: Arc<dyn TextGenerator>,
    settings: PipelineConfig,
    output: OutputConfig,
}

impl BatchRunner {
    pub fn new(client: Arc<dyn TextGenerator>, config: &Config) -> Self {
        let pipeline = Arc::new(HallucinationPipeline::new(Arc::clone(&client), config));
        Self::with_pipeline(pipeline, client, config)
    }

    /// Use an existing pipeline. `client` is only read for usage totals.
    pub fn with_pipeline(
        pipeline: Arc<HallucinationPipeline>,
        client: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            pipeline,
            client,
            settings: config.pipeline.clone(),
            output: config.output.clone(),
        }
    }

    /// Load examples from a JSONL file or a JSON array file.
    pub fn load_examples(path: &Path) -> Result<Vec<BaseExample>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HalluvalError::io("reading examples file", e))?;
        let examples = Self::parse_examples(&content)?;
        info!(count = examples.len(), "Loaded examples");
        Ok(examples)
    }

    /// Parse examples. Input starting with `[` is a JSON array, anything else is
    /// JSONL with blank lines skipped.
    pub fn parse_examples(content: &str) -> Result<Vec<BaseExample>> {
        if content.trim_start().starts_with('[') {
            return serde_json::from_str(content)
                .map_err(|e| HalluvalError::ParseError(format!("JSON array: {e}")));
        }

        let mut examples = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let example: BaseExample = serde_json::from_str(line)
                .map_err(|e| HalluvalError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
            examples.push(example);
        }
        Ok(examples)
    }

    /// Run every example and write one `BatchRecord` per success, in input order.
    ///
    /// A failed example is logged and counted unless `fail_fast` is set, in which
    /// case the remaining examples are cancelled and the error is returned.
    pub async fn run(&self, examples: Vec<BaseExample>, output_path: &Path) -> Result<RunStats> {
        let start = Instant::now();
        let total = examples.len();
        let concurrency = self.settings.concurrency.max(1);
        let usage_before = self.client.usage();

        info!(
            total_examples = total,
            concurrency,
            fail_fast = self.settings.fail_fast,
            "Starting hallucination scoring run"
        );

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let output_file =
            File::create(output_path).map_err(|e| HalluvalError::io("creating output file", e))?;
        let mut writer = BufWriter::new(output_file);

        let mut stats = RunStats {
            total_examples: total,
            ..RunStats::default()
        };

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        let mut task_index: HashMap<task::Id, usize> = HashMap::with_capacity(total);
        for (index, example) in examples.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let handle = tasks.spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => pipeline.run(&example).await,
                    Err(_) => Err(HalluvalError::Internal("concurrency limiter closed".into())),
                }
            });
            task_index.insert(handle.id(), index);
        }

        // Results arrive in completion order; hold them until their turn.
        let mut pending: BTreeMap<usize, Option<VariantBatch>> = BTreeMap::new();
        let mut next_index = 0;

        while let Some(joined) = tasks.join_next_with_id().await {
            // A panicked or aborted task counts as a failed example.
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(join_err) => (
                    join_err.id(),
                    Err(HalluvalError::Internal(format!(
                        "example task failed: {join_err}"
                    ))),
                ),
            };
            let index = task_index.remove(&id).ok_or_else(|| {
                HalluvalError::Internal(format!("result from unknown task {id}"))
            })?;

            match result {
                Ok(batch) => {
                    stats.record_batch(&batch);
                    pending.insert(index, Some(batch));
                }
                Err(e) => {
                    stats.total_failed += 1;
                    warn!(
                        example = index,
                        variant = e.variant().map(|k| k.as_str()),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Example failed"
                    );
                    if self.settings.fail_fast {
                        writer
                            .flush()
                            .map_err(|io_err| HalluvalError::io("flushing output", io_err))?;
                        pb.abandon_with_message(format!("Aborted at example {index}"));
                        return Err(e);
                    }
                    pending.insert(index, None);
                }
            }

            while let Some(entry) = pending.remove(&next_index) {
                if let Some(variants) = entry {
                    let record = BatchRecord {
                        id: Uuid::new_v4().to_string(),
                        example_index: next_index,
                        completed_at: Utc::now(),
                        variants,
                    };
                    let json = serde_json::to_string(&record).map_err(|e| {
                        HalluvalError::Internal(format!("Failed to serialize record: {e}"))
                    })?;
                    writeln!(writer, "{json}")
                        .map_err(|e| HalluvalError::io("writing output", e))?;
                }
                next_index += 1;
            }

            pb.inc(1);
            pb.set_message(format!(
                "completed: {}, failed: {}",
                stats.total_completed, stats.total_failed
            ));
        }

        writer
            .flush()
            .map_err(|e| HalluvalError::io("flushing output", e))?;
        pb.finish_with_message(format!(
            "Done! {} completed, {} failed",
            stats.total_completed, stats.total_failed
        ));

        if self.output.track_costs {
            let usage = self.client.usage();
            stats.input_tokens = usage.input_tokens.saturating_sub(usage_before.input_tokens);
            stats.output_tokens = usage.output_tokens.saturating_sub(usage_before.output_tokens);
            stats.cost_usd = (usage.cost_usd - usage_before.cost_usd).max(0.0);
        }

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        info!(
            completed = stats.total_completed,
            failed = stats.total_failed,
            parse_defaults = stats.judge_parse_defaults,
            hallucination_mean = format!("{:.3}", stats.hallucination.mean_score),
            throughput = format!("{:.0}/hr", stats.throughput_per_hour),
            cost = format!("${:.4}", stats.cost_usd),
            "Scoring run complete"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ServiceError, VariantKind};
    use crate::pipeline::testing::StubBackend;
    use std::io::BufRead;
    use std::time::Duration;
    use tempfile::TempDir;

    fn examples(n: usize) -> Vec<BaseExample> {
        (0..n)
            .map(|i| {
                BaseExample::new(
                    format!("Fact number {i}."),
                    format!("What is fact {i}?"),
                    format!("Answer {i} is known."),
                )
            })
            .collect()
    }

    fn read_records(path: &Path) -> Vec<BatchRecord> {
        let file = File::open(path).unwrap();
        std::io::BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect()
    }

    fn config(concurrency: usize, fail_fast: bool) -> Config {
        let mut config = Config::default();
        config.pipeline.concurrency = concurrency;
        config.pipeline.fail_fast = fail_fast;
        config
    }

    /// Fails generation for the example whose question mentions `fact {n}`.
    fn failing_on(n: usize) -> StubBackend {
        let needle = format!("What is fact {n}?");
        StubBackend::new().with_hallucination(move |prompt| {
            if prompt.contains(&needle) {
                Err(ServiceError::ApiError {
                    status: 503,
                    message: "overloaded".into(),
                })
            } else {
                Ok("A fabricated answer.".into())
            }
        })
    }

    #[test]
    fn test_parse_jsonl_skips_blank_lines() {
        let content = "{\"context\":\"c1\",\"question\":\"q1\",\"correctAnswer\":\"a1\"}\n\n   \n{\"context\":\"c2\",\"question\":\"q2\",\"correctAnswer\":\"a2\"}\n";
        let parsed = BatchRunner::parse_examples(content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].correct_answer, "a2");
    }

    #[test]
    fn test_parse_json_array() {
        let content = r#"  [{"context":"c","question":"q","correctAnswer":"a","metadata":{"source":"wiki"}}]"#;
        let parsed = BatchRunner::parse_examples(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].metadata.is_some());
    }

    #[test]
    fn test_parse_error_reports_line() {
        let content = "{\"context\":\"c\",\"question\":\"q\",\"correctAnswer\":\"a\"}\n{\"context\": oops}\n";
        let err = BatchRunner::parse_examples(content).unwrap_err();
        assert!(err.to_string().contains("Line 2"));
    }

    #[test]
    fn test_load_examples_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.jsonl");
        std::fs::write(
            &path,
            "{\"context\":\"c\",\"question\":\"q\",\"correctAnswer\":\"a\"}\n",
        )
        .unwrap();
        assert_eq!(BatchRunner::load_examples(&path).unwrap().len(), 1);

        let missing = BatchRunner::load_examples(&dir.path().join("missing.jsonl")).unwrap_err();
        assert!(matches!(missing, HalluvalError::Io { .. }));
    }

    #[tokio::test]
    async fn test_run_writes_records_in_input_order() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let backend = Arc::new(StubBackend::new());
        let runner = BatchRunner::new(backend, &config(4, false));

        let stats = runner.run(examples(7), &output).await.unwrap();
        assert_eq!(stats.total_examples, 7);
        assert_eq!(stats.total_completed, 7);
        assert_eq!(stats.total_failed, 0);
        assert_eq!(stats.original.mean_score, 1.0);
        assert_eq!(stats.kind(VariantKind::Partial).mean_score, 0.5);

        let records = read_records(&output);
        let indices: Vec<_> = records.iter().map(|r| r.example_index).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
        for (i, record) in records.iter().enumerate() {
            assert!(record.variants.is_fully_scored());
            assert_eq!(
                record.variants.get(VariantKind::Original).generated_answer,
                format!("Answer {i} is known.")
            );
        }
    }

    #[tokio::test]
    async fn test_failed_example_skipped_not_partially_written() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let runner = BatchRunner::new(Arc::new(failing_on(2)), &config(2, false));

        let stats = runner.run(examples(4), &output).await.unwrap();
        assert_eq!(stats.total_completed, 3);
        assert_eq!(stats.total_failed, 1);

        let indices: Vec<_> = read_records(&output)
            .iter()
            .map(|r| r.example_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 3]);
    }

    #[tokio::test]
    async fn test_panicking_example_counted_as_failure() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let backend = StubBackend::new().with_hallucination(|prompt| {
            if prompt.contains("What is fact 0?") {
                panic!("backend crashed");
            }
            Ok("A fabricated answer.".into())
        });
        let runner = BatchRunner::new(Arc::new(backend), &config(4, false));

        let stats = runner.run(examples(3), &output).await.unwrap();
        assert_eq!(stats.total_completed, 2);
        assert_eq!(stats.total_failed, 1);

        let indices: Vec<_> = read_records(&output)
            .iter()
            .map(|r| r.example_index)
            .collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fail_fast_returns_error() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let runner = BatchRunner::new(Arc::new(failing_on(0)), &config(1, true));

        let err = tokio::time::timeout(Duration::from_secs(5), runner.run(examples(3), &output))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.variant(), Some(VariantKind::Hallucination));
        assert!(err.is_retryable());
        assert!(read_records(&output).is_empty());
    }

    #[tokio::test]
    async fn test_usage_tracked_per_run() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let runner = BatchRunner::new(Arc::new(StubBackend::new()), &config(2, false));

        let stats = runner.run(examples(2), &output).await.unwrap();
        // Two generation and three judge calls per example.
        assert_eq!(stats.input_tokens, 100);
        assert_eq!(stats.output_tokens, 50);
        assert!((stats.cost_usd - 0.01).abs() < 1e-9);

        let mut untracked = config(2, false);
        untracked.output.track_costs = false;
        let runner = BatchRunner::new(Arc::new(StubBackend::new()), &untracked);
        let stats = runner.run(examples(2), &output).await.unwrap();
        assert_eq!(stats.input_tokens, 0);
        assert_eq!(stats.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.jsonl");
        let runner = BatchRunner::new(Arc::new(StubBackend::new()), &config(4, false));

        let stats = runner.run(Vec::new(), &output).await.unwrap();
        assert_eq!(stats.total_examples, 0);
        assert_eq!(stats.throughput_per_hour, 0.0);
        assert!(read_records(&output).is_empty());
    }
}
