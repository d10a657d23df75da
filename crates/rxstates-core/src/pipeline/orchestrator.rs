//! Batch orchestrator: the sequential validation loop.
//!
//! Batches run strictly one after another. Each batch is retried up to
//! `max_attempts` calls, then downgraded to error rows, so no single batch
//! can fail a run. Only configuration, sink and checkpoint errors are fatal.

use super::batch::{partition, Batch};
use super::checkpoint::{RunCheckpoint, RunFingerprint};
use crate::config::{Config, PolicyConfig};
use crate::dataset::Dataset;
use crate::error::{ConfigError, ParseError, ProviderError, RxError};
use crate::parse::{parse_reply, ParseStage};
use crate::provider::{retry, ValidationProvider};
use crate::sink::{CsvSink, ResultSink};
use crate::types::{RunSummary, ValidationResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Loop settings, usually taken from `[batch]` and `[output]`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_size: usize,
    /// Pause between provider calls
    pub rate_limit_delay: Duration,
    /// Provider calls per batch, counting the first
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_backoff_ms: u64,
    /// Leave the checkpoint file behind after a completed run
    pub keep_checkpoint: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: 30,
            rate_limit_delay: Duration::from_secs(2),
            max_attempts: 3,
            retry_delay_ms: 1000,
            rate_limit_backoff_ms: 10_000,
            keep_checkpoint: false,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch.batch_size,
            rate_limit_delay: Duration::from_secs_f64(config.batch.rate_limit_delay_secs.max(0.0)),
            max_attempts: config.batch.max_attempts,
            retry_delay_ms: config.batch.retry_delay_ms,
            rate_limit_backoff_ms: config.batch.rate_limit_backoff_ms,
            keep_checkpoint: config.output.keep_checkpoint,
        }
    }
}

/// Where a run writes, and whether it may pick up an earlier one.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub fingerprint: RunFingerprint,
    /// Output file for a fresh run. A resumed run keeps its original file.
    pub output_path: PathBuf,
    pub checkpoint_path: PathBuf,
    /// Honour a matching checkpoint if one exists
    pub resume: bool,
}

/// Progress notifications for the caller.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// The loop is about to start; `resumed` batches are already done.
    Planned { total: usize, resumed: usize },
    Started { index: usize, total: usize, rows: usize },
    Retrying {
        index: usize,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Finished {
        index: usize,
        total: usize,
        outcome: BatchOutcome,
    },
    Waiting { delay: Duration },
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Validated {
        stage: ParseStage,
        /// Rows the reply did not cover
        missing: usize,
    },
    /// Every attempt failed; all rows are error rows.
    Failed { reason: String },
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One result per input row, in input order
    pub results: Vec<ValidationResult>,
    pub summary: RunSummary,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Stopped between batches; the checkpoint is left for a later resume.
    Interrupted {
        output_path: PathBuf,
        checkpoint_path: PathBuf,
        batches_done: usize,
        total_batches: usize,
    },
}

enum Failure {
    Provider(ProviderError),
    Parse(ParseError),
}

/// Runs every batch of a dataset through one provider.
pub struct Validator<P: ValidationProvider> {
    provider: P,
    options: RunOptions,
    policy: PolicyConfig,
    stop: Arc<AtomicBool>,
}

impl<P: ValidationProvider> Validator<P> {
    pub fn new(provider: P, options: RunOptions, policy: PolicyConfig) -> Self {
        Self {
            provider,
            options,
            policy,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, stops the run before the next batch.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Validate every record in `dataset`.
    ///
    /// Rows are written to the output as each batch finishes and the
    /// checkpoint advances after every write, so an interrupted run can be
    /// resumed with the same plan.
    pub async fn run<F>(
        &self,
        dataset: &Dataset,
        plan: &RunPlan,
        mut on_event: F,
    ) -> Result<RunOutcome, RxError>
    where
        F: FnMut(&BatchEvent),
    {
        if dataset.records.is_empty() {
            return Err(ConfigError::EmptyInput(dataset.path.clone()).into());
        }
        if self.options.batch_size == 0 {
            return Err(ConfigError::ValidationError("batch.batch_size must be > 0".into()).into());
        }
        if self.options.max_attempts == 0 {
            return Err(
                ConfigError::ValidationError("batch.max_attempts must be > 0".into()).into(),
            );
        }

        let batches = partition(&dataset.records, self.options.batch_size);
        let total = batches.len();
        let label = self.provider.label();

        let previous = if plan.resume {
            RunCheckpoint::load(&plan.checkpoint_path)
        } else {
            None
        };
        let previous = previous.filter(|cp| {
            let usable = cp.matches(&plan.fingerprint, self.options.batch_size, total)
                && cp.rows_written == rows_before(&batches, cp.next_batch())
                && cp.completed.len() == cp.next_batch();
            if !usable {
                tracing::warn!(
                    "Checkpoint {:?} does not match this run, starting fresh",
                    plan.checkpoint_path
                );
            }
            usable
        });

        let (mut checkpoint, mut sink, mut results) = match previous {
            Some(cp) => {
                let (sink, restored) = CsvSink::restore(
                    &cp.output_path,
                    &dataset.records,
                    &dataset.headers,
                    label,
                    cp.rows_written,
                )?;
                tracing::info!(
                    "Resuming from checkpoint: {}/{} batches already complete",
                    cp.completed.len(),
                    total
                );
                (cp, sink, restored)
            }
            None => {
                let cp = RunCheckpoint::new(
                    &plan.fingerprint,
                    plan.output_path.clone(),
                    self.options.batch_size,
                    total,
                );
                let sink = CsvSink::create(&plan.output_path, &dataset.headers, label)?;
                cp.save(&plan.checkpoint_path)?;
                (cp, sink, Vec::with_capacity(dataset.records.len()))
            }
        };

        let mut summary = RunSummary {
            batches_resumed: checkpoint.completed.len(),
            ..RunSummary::default()
        };
        on_event(&BatchEvent::Planned {
            total,
            resumed: summary.batches_resumed,
        });

        tracing::info!(
            "Validating {} pharmacies in {} batches of up to {} with {} ({})",
            dataset.records.len(),
            total,
            self.options.batch_size,
            self.provider.name(),
            self.provider.model()
        );

        for batch in &batches {
            if checkpoint.is_complete(batch.index) {
                continue;
            }
            if self.stop.load(Ordering::SeqCst) {
                tracing::warn!(
                    "Stopping before batch {}/{}; progress saved to {:?}",
                    batch.index + 1,
                    total,
                    plan.checkpoint_path
                );
                return Ok(RunOutcome::Interrupted {
                    output_path: checkpoint.output_path.clone(),
                    checkpoint_path: plan.checkpoint_path.clone(),
                    batches_done: checkpoint.completed.len(),
                    total_batches: total,
                });
            }

            tracing::info!(
                "Processing batch {}/{} ({} pharmacies)",
                batch.index + 1,
                total,
                batch.len()
            );
            on_event(&BatchEvent::Started {
                index: batch.index,
                total,
                rows: batch.len(),
            });

            let (batch_results, outcome, retries) = self.validate_batch(batch, &mut on_event).await;
            summary.batches_processed += 1;
            summary.retries += retries;
            if matches!(outcome, BatchOutcome::Failed { .. }) {
                summary.batches_failed += 1;
            }

            sink.append(&batch_results)?;
            sink.flush()?;
            checkpoint.mark_complete(batch.index, batch_results.len());
            checkpoint.save(&plan.checkpoint_path)?;
            tracing::debug!(
                "Checkpoint updated: {} batches, {} rows",
                checkpoint.completed.len(),
                sink.rows_written()
            );
            results.extend(batch_results);

            on_event(&BatchEvent::Finished {
                index: batch.index,
                total,
                outcome,
            });

            let is_last = batch.index + 1 == total;
            if !is_last && !self.options.rate_limit_delay.is_zero() {
                tracing::debug!(
                    "Waiting {:?} before the next batch",
                    self.options.rate_limit_delay
                );
                on_event(&BatchEvent::Waiting {
                    delay: self.options.rate_limit_delay,
                });
                tokio::time::sleep(self.options.rate_limit_delay).await;
            }
        }

        sink.flush()?;
        if self.options.keep_checkpoint {
            tracing::debug!("Keeping checkpoint {:?}", plan.checkpoint_path);
        } else {
            RunCheckpoint::discard(&plan.checkpoint_path)?;
        }

        let tally = RunSummary::tally(&results);
        let summary = RunSummary {
            total: tally.total,
            correct: tally.correct,
            incorrect: tally.incorrect,
            unknown: tally.unknown,
            errors: tally.errors,
            ..summary
        };
        tracing::info!(
            "Validation complete: {} total, {} correct, {} incorrect, {} unknown, {} errors ({:.1}% success)",
            summary.total,
            summary.correct,
            summary.incorrect,
            summary.unknown,
            summary.errors,
            summary.success_rate()
        );
        tracing::info!("Results written to {:?}", checkpoint.output_path);

        Ok(RunOutcome::Completed(RunReport {
            results,
            summary,
            output_path: checkpoint.output_path,
        }))
    }

    /// One batch with retries. Always yields one result per row.
    async fn validate_batch<F>(
        &self,
        batch: &Batch,
        on_event: &mut F,
    ) -> (Vec<ValidationResult>, BatchOutcome, u32)
    where
        F: FnMut(&BatchEvent),
    {
        let timeout = self.provider.timeout();
        let mut retries = 0u32;
        let mut reason = String::new();

        for attempt in 0..self.options.max_attempts {
            let failure = match tokio::time::timeout(timeout, self.provider.validate_batch(batch))
                .await
            {
                Ok(Ok(reply)) => match parse_reply(&reply.text, batch, &self.policy) {
                    Ok(parsed) => {
                        tracing::debug!(
                            "Batch {} answered by {} in {}ms ({} tokens, {} sources, {:?} parse)",
                            batch.index + 1,
                            reply.model,
                            reply.latency_ms,
                            reply.tokens_used.map_or("?".to_string(), |t| t.to_string()),
                            reply.grounding_sources,
                            parsed.stage
                        );
                        if !parsed.missing.is_empty() {
                            tracing::warn!(
                                "Batch {}: no reply entry for {:?}",
                                batch.index + 1,
                                parsed.missing
                            );
                        }
                        let outcome = BatchOutcome::Validated {
                            stage: parsed.stage,
                            missing: parsed.missing.len(),
                        };
                        return (parsed.results, outcome, retries);
                    }
                    Err(e) => Failure::Parse(e),
                },
                Ok(Err(e)) => Failure::Provider(e),
                Err(_) => Failure::Provider(ProviderError::Timeout {
                    provider: self.provider.name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };

            let delay = match &failure {
                Failure::Provider(e) => {
                    reason = format!("API error: {e}");
                    if !retry::is_retryable(e) {
                        tracing::error!(
                            "Batch {} failed with a non-retryable error: {e}",
                            batch.index + 1
                        );
                        break;
                    }
                    retry::delay_for(
                        e,
                        attempt,
                        self.options.retry_delay_ms,
                        self.options.rate_limit_backoff_ms,
                    )
                }
                Failure::Parse(e) => {
                    reason = format!("Failed to parse AI response: {e}");
                    retry::backoff_duration(attempt, self.options.retry_delay_ms)
                }
            };

            if attempt + 1 < self.options.max_attempts {
                tracing::warn!(
                    "Batch {} attempt {}/{} failed: {reason}; retrying in {delay:?}",
                    batch.index + 1,
                    attempt + 1,
                    self.options.max_attempts
                );
                on_event(&BatchEvent::Retrying {
                    index: batch.index,
                    attempt: attempt + 1,
                    delay,
                    error: reason.clone(),
                });
                retries += 1;
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            "Batch {} failed: {reason}; marking {} pharmacies as errors",
            batch.index + 1,
            batch.len()
        );
        let results = batch
            .records
            .iter()
            .map(|record| ValidationResult::error(record, reason.clone()))
            .collect();
        (results, BatchOutcome::Failed { reason }, retries)
    }
}

/// Rows in batches `0..next`.
fn rows_before(batches: &[Batch], next: usize) -> usize {
    batches.iter().take(next).map(Batch::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputConfig;
    use crate::pipeline::RunSettings;
    use crate::provider::RawReply;
    use crate::types::{fixtures, Confidence, Verdict};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    type ResponseFn = Box<dyn Fn(u32, &Batch) -> Result<RawReply, ProviderError> + Send + Sync>;

    /// A configurable mock provider.
    ///
    /// Each call invokes the response factory with the call index and the
    /// batch, so tests can fail specific batches or attempts.
    struct MockProvider {
        response_fn: ResponseFn,
        call_count: Arc<AtomicU32>,
    }

    impl MockProvider {
        fn new(
            response_fn: impl Fn(u32, &Batch) -> Result<RawReply, ProviderError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                response_fn: Box::new(response_fn),
                call_count: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Confirms every pharmacy's claim with high confidence.
        fn confirming() -> Self {
            Self::new(|_, batch| Ok(reply(confirm_all(batch))))
        }

        fn call_count_handle(&self) -> Arc<AtomicU32> {
            self.call_count.clone()
        }
    }

    #[async_trait]
    impl ValidationProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn label(&self) -> &str {
            "Mock"
        }

        fn model(&self) -> &str {
            "mock-v1"
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn validate_batch(&self, batch: &Batch) -> Result<RawReply, ProviderError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            (self.response_fn)(idx, batch)
        }
    }

    fn reply(text: String) -> RawReply {
        RawReply {
            text,
            model: "mock-v1".to_string(),
            tokens_used: Some(42),
            latency_ms: 5,
            grounding_sources: 0,
        }
    }

    fn confirm_all(batch: &Batch) -> String {
        let entries: Vec<serde_json::Value> = batch
            .records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "pharmacy_id": r.id,
                    "is_correct": true,
                    "corrected_states": "",
                    "confidence": "high",
                    "reasoning": format!("{} verified", r.id),
                })
            })
            .collect();
        serde_json::json!({ "validations": entries }).to_string()
    }

    fn network_error() -> ProviderError {
        ProviderError::Network {
            provider: "mock".into(),
            message: "connection reset".into(),
        }
    }

    fn dataset(n: usize) -> Dataset {
        Dataset {
            path: PathBuf::from("pharmacies.csv"),
            headers: Arc::new(fixtures::HEADERS.iter().map(|h| h.to_string()).collect()),
            records: fixtures::records(n),
        }
    }

    fn fast_options(batch_size: usize) -> RunOptions {
        RunOptions {
            batch_size,
            rate_limit_delay: Duration::ZERO,
            max_attempts: 3,
            retry_delay_ms: 1,
            rate_limit_backoff_ms: 1,
            keep_checkpoint: false,
        }
    }

    fn fingerprint(input: &[u8], policy: &PolicyConfig) -> RunFingerprint {
        let columns = InputConfig::default();
        let settings = RunSettings {
            batch_size: 3,
            provider: "mock",
            model: "mock-v1",
            columns: &columns,
            policy,
        };
        RunFingerprint::from_parts(input, &settings)
    }

    fn plan(dir: &std::path::Path, output: &str) -> RunPlan {
        RunPlan {
            fingerprint: fingerprint(b"pharmacies", &PolicyConfig::default()),
            output_path: dir.join(output),
            checkpoint_path: dir.join("pharmacies.checkpoint.json"),
            resume: true,
        }
    }

    fn completed(outcome: RunOutcome) -> RunReport {
        match outcome {
            RunOutcome::Completed(report) => report,
            RunOutcome::Interrupted { batches_done, .. } => {
                panic!("Expected completion, interrupted after {batches_done} batches")
            }
        }
    }

    fn output_rows(path: &std::path::Path) -> Vec<csv::StringRecord> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_failing_middle_batch_downgrades_only_its_rows() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|_, batch| {
            if batch.index == 1 {
                Err(network_error())
            } else {
                Ok(reply(confirm_all(batch)))
            }
        });
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());
        let plan = plan(dir.path(), "out.csv");

        let report = completed(validator.run(&dataset(65), &plan, |_| {}).await.unwrap());

        assert_eq!(report.results.len(), 65);
        for (i, r) in report.results.iter().enumerate() {
            assert_eq!(r.record.row_index, i);
            if (30..60).contains(&i) {
                assert_eq!(r.confidence, Confidence::Error, "row {i}");
                assert_eq!(r.initial_correct, Verdict::Unknown);
                assert!(r.reasoning.starts_with("API error"));
            } else {
                assert_eq!(r.confidence, Confidence::High, "row {i}");
                assert_eq!(r.initial_correct, Verdict::True);
            }
        }
        // 1 + 3 + 1 calls
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.summary.total, 65);
        assert_eq!(report.summary.errors, 30);
        assert_eq!(report.summary.batches_failed, 1);
        assert_eq!(report.summary.retries, 2);

        let rows = output_rows(&plan.output_path);
        assert_eq!(rows.len(), 65);
        assert_eq!(&rows[30][6], "error");
        assert_eq!(&rows[64][6], "high");
        assert!(!plan.checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_permanent_failure_uses_exactly_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|_, _| {
            Err(ProviderError::Http {
                provider: "mock".into(),
                status: 503,
                message: "unavailable".into(),
            })
        });
        let calls = provider.call_count_handle();
        let options = RunOptions {
            max_attempts: 4,
            ..fast_options(30)
        };
        let validator = Validator::new(provider, options, PolicyConfig::default());

        let report = completed(
            validator
                .run(&dataset(3), &plan(dir.path(), "out.csv"), |_| {})
                .await
                .unwrap(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(report.results.iter().all(|r| r.is_error()));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|_, _| {
            Err(ProviderError::Auth {
                provider: "mock".into(),
                status: 401,
                message: "invalid api key".into(),
            })
        });
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());

        let report = completed(
            validator
                .run(&dataset(2), &plan(dir.path(), "out.csv"), |_| {})
                .await
                .unwrap(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.summary.errors, 2);
        assert_eq!(report.summary.retries, 0);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|idx, batch| {
            if idx == 0 {
                Ok(reply("I was unable to find licensing data.".into()))
            } else {
                Ok(reply(confirm_all(batch)))
            }
        });
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());

        let mut events = Vec::new();
        let report = completed(
            validator
                .run(&dataset(2), &plan(dir.path(), "out.csv"), |e| events.push(e.clone()))
                .await
                .unwrap(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.summary.errors, 0);
        assert_eq!(report.summary.retries, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, BatchEvent::Retrying { attempt: 1, .. })));
    }

    #[tokio::test]
    async fn test_exhausted_parse_failures_describe_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|_, _| Ok(reply("no data".into())));
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());

        let report = completed(
            validator
                .run(&dataset(1), &plan(dir.path(), "out.csv"), |_| {})
                .await
                .unwrap(),
        );
        assert!(report.results[0]
            .reasoning
            .starts_with("Failed to parse AI response"));
    }

    #[tokio::test]
    async fn test_missing_pharmacy_errors_only_that_row() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|_, batch| {
            let mut partial = batch.clone();
            partial.records.retain(|r| r.id != "P2");
            Ok(reply(confirm_all(&partial)))
        });
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());

        let report = completed(
            validator
                .run(&dataset(3), &plan(dir.path(), "out.csv"), |_| {})
                .await
                .unwrap(),
        );

        let errors: Vec<&str> = report
            .results
            .iter()
            .filter(|r| r.is_error())
            .map(|r| r.record.id.as_str())
            .collect();
        assert_eq!(errors, vec!["P2"]);
        assert_eq!(report.summary.batches_failed, 0);
    }

    #[tokio::test]
    async fn test_correction_flows_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new(|_, batch| {
            let id = &batch.records[0].id;
            Ok(reply(format!(
                r#"{{"validations": [{{"pharmacy_id": "{id}", "is_correct": false,
                    "corrected_states": "CA, NY, TX", "confidence": "medium",
                    "reasoning": "Texas license found"}}]}}"#
            )))
        });
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());
        let plan = plan(dir.path(), "out.csv");

        let report = completed(validator.run(&dataset(1), &plan, |_| {}).await.unwrap());
        assert_eq!(report.results[0].initial_correct, Verdict::False);
        assert_eq!(report.results[0].corrected_states, vec!["CA", "NY", "TX"]);

        let rows = output_rows(&plan.output_path);
        assert_eq!(&rows[0][4], "false");
        assert_eq!(&rows[0][5], "CA, NY, TX");
        assert_eq!(&rows[0][6], "medium");
    }

    #[tokio::test]
    async fn test_resume_after_interruption_matches_uninterrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(7);

        // Reference: one uninterrupted run
        let reference = Validator::new(MockProvider::confirming(), fast_options(3), PolicyConfig::default());
        let reference_plan = RunPlan {
            checkpoint_path: dir.path().join("reference.checkpoint.json"),
            ..plan(dir.path(), "reference.csv")
        };
        let expected = completed(reference.run(&data, &reference_plan, |_| {}).await.unwrap());

        // Interrupted after the first batch
        let first = Validator::new(MockProvider::confirming(), fast_options(3), PolicyConfig::default());
        let stop = first.stop_handle();
        let plan = plan(dir.path(), "resumed.csv");
        let outcome = first
            .run(&data, &plan, |e| {
                if matches!(e, BatchEvent::Finished { index: 0, .. }) {
                    stop.store(true, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();
        match outcome {
            RunOutcome::Interrupted {
                batches_done,
                total_batches,
                ..
            } => {
                assert_eq!(batches_done, 1);
                assert_eq!(total_batches, 3);
            }
            RunOutcome::Completed(_) => panic!("Expected interruption"),
        }
        assert!(plan.checkpoint_path.exists());

        // A crash mid-batch may leave rows past the checkpoint
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&plan.output_path)
                .unwrap();
            file.write_all(b"P4,Pharmacy P4,Springfield,\"CA, NY\",true,,high,partial\n")
                .unwrap();
        }

        // Resume under a fresh output name; the checkpoint's file is reused
        let second_provider = MockProvider::confirming();
        let calls = second_provider.call_count_handle();
        let second = Validator::new(second_provider, fast_options(3), PolicyConfig::default());
        let resume_plan = RunPlan {
            output_path: dir.path().join("ignored.csv"),
            ..plan.clone()
        };
        let report = completed(second.run(&data, &resume_plan, |_| {}).await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.output_path, plan.output_path);
        assert_eq!(report.summary.batches_resumed, 1);
        assert_eq!(report.results, expected.results);
        assert_eq!(
            std::fs::read(&plan.output_path).unwrap(),
            std::fs::read(&reference_plan.output_path).unwrap()
        );
        assert!(!resume_plan.output_path.exists());
        assert!(!plan.checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_foreign_checkpoint_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan(dir.path(), "out.csv");

        let other = fingerprint(b"another input", &PolicyConfig::default());
        let mut stale = RunCheckpoint::new(&other, dir.path().join("old.csv"), 3, 2);
        stale.mark_complete(0, 3);
        stale.save(&plan.checkpoint_path).unwrap();

        let provider = MockProvider::confirming();
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(3), PolicyConfig::default());
        let report = completed(validator.run(&dataset(6), &plan, |_| {}).await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.summary.batches_resumed, 0);
        assert_eq!(report.output_path, plan.output_path);
        assert_eq!(output_rows(&plan.output_path).len(), 6);
    }

    #[tokio::test]
    async fn test_checkpoint_from_other_policy_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan(dir.path(), "out.csv");

        let narrowing_only = PolicyConfig {
            accept_widening: false,
            ..PolicyConfig::default()
        };
        let other = fingerprint(b"pharmacies", &narrowing_only);
        assert_ne!(other, plan.fingerprint);
        let mut stale = RunCheckpoint::new(&other, plan.output_path.clone(), 3, 2);
        stale.mark_complete(0, 3);
        stale.save(&plan.checkpoint_path).unwrap();

        let provider = MockProvider::confirming();
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(3), PolicyConfig::default());
        let report = completed(validator.run(&dataset(6), &plan, |_| {}).await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.summary.batches_resumed, 0);
        assert_eq!(output_rows(&plan.output_path).len(), 6);
    }

    #[tokio::test]
    async fn test_fresh_plan_ignores_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RunPlan {
            resume: false,
            ..plan(dir.path(), "out.csv")
        };
        let mut cp = RunCheckpoint::new(&plan.fingerprint, dir.path().join("old.csv"), 3, 2);
        cp.mark_complete(0, 3);
        cp.save(&plan.checkpoint_path).unwrap();

        let provider = MockProvider::confirming();
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(3), PolicyConfig::default());
        completed(validator.run(&dataset(6), &plan, |_| {}).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_delay_between_batches_only() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            rate_limit_delay: Duration::from_millis(20),
            ..fast_options(2)
        };
        let validator = Validator::new(MockProvider::confirming(), options, PolicyConfig::default());

        let mut waits = 0;
        let started = std::time::Instant::now();
        completed(
            validator
                .run(&dataset(6), &plan(dir.path(), "out.csv"), |e| {
                    if matches!(e, BatchEvent::Waiting { .. }) {
                        waits += 1;
                    }
                })
                .await
                .unwrap(),
        );
        assert_eq!(waits, 2);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_keep_checkpoint_option() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            keep_checkpoint: true,
            ..fast_options(30)
        };
        let validator = Validator::new(MockProvider::confirming(), options, PolicyConfig::default());
        let plan = plan(dir.path(), "out.csv");
        completed(validator.run(&dataset(2), &plan, |_| {}).await.unwrap());

        let cp = RunCheckpoint::load(&plan.checkpoint_path).unwrap();
        assert_eq!(cp.rows_written, 2);
        assert_eq!(cp.completed.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_runs_rejected_before_any_call() {
        let dir = tempfile::tempdir().unwrap();

        let provider = MockProvider::confirming();
        let calls = provider.call_count_handle();
        let validator = Validator::new(provider, fast_options(30), PolicyConfig::default());
        let err = validator
            .run(&dataset(0), &plan(dir.path(), "out.csv"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, RxError::Config(ConfigError::EmptyInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let validator = Validator::new(
            MockProvider::confirming(),
            fast_options(0),
            PolicyConfig::default(),
        );
        let err = validator
            .run(&dataset(2), &plan(dir.path(), "out.csv"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, RxError::Config(ConfigError::ValidationError(_))));

        let options = RunOptions {
            max_attempts: 0,
            ..fast_options(30)
        };
        let validator = Validator::new(MockProvider::confirming(), options, PolicyConfig::default());
        let err = validator
            .run(&dataset(2), &plan(dir.path(), "out.csv"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, RxError::Config(ConfigError::ValidationError(_))));
        assert!(!dir.path().join("out.csv").exists());
    }
}
