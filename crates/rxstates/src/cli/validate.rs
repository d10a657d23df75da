//! The `rxstates validate` command.

use super::provider::ProviderArgs;
use chrono::{DateTime, Local};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rxstates_core::pipeline::batch_count;
use rxstates_core::{
    BatchEvent, BatchOutcome, Config, Dataset, ProviderFactory, RunFingerprint, RunOptions,
    RunOutcome, RunPlan, RunReport, RunSettings, ValidationProvider, Validator,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    /// Input CSV file of pharmacies
    #[arg(required = true)]
    pub input: PathBuf,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Pharmacies per provider call
    #[arg(long, env = "RXSTATES_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Seconds to wait between provider calls
    #[arg(long, env = "RXSTATES_RATE_LIMIT_DELAY")]
    pub rate_limit_delay: Option<f64>,

    /// Provider calls per batch before its rows are marked as errors
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Directory for the output CSV and checkpoint
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output file (overrides the timestamped default name)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Checkpoint file (defaults to <output dir>/<input name>.checkpoint.json)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Ignore any checkpoint and start from the first batch
    #[arg(long)]
    pub fresh: bool,

    /// Keep the checkpoint file after a completed run
    #[arg(long)]
    pub keep_checkpoint: bool,

    /// Column holding the claimed states
    #[arg(long)]
    pub states_column: Option<String>,

    /// Column holding the pharmacy identifier
    #[arg(long)]
    pub id_column: Option<String>,
}

impl ValidateArgs {
    /// Fold command-line overrides into the loaded config.
    fn apply(&self, config: &mut Config) {
        self.provider.apply(config);
        if let Some(size) = self.batch_size {
            config.batch.batch_size = size;
        }
        if let Some(delay) = self.rate_limit_delay {
            config.batch.rate_limit_delay_secs = delay;
        }
        if let Some(attempts) = self.max_attempts {
            config.batch.max_attempts = attempts;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(path) = &self.checkpoint {
            config.output.checkpoint_path = Some(path.clone());
        }
        if self.keep_checkpoint {
            config.output.keep_checkpoint = true;
        }
        if let Some(column) = &self.states_column {
            config.input.states_column = column.clone();
        }
        if let Some(column) = &self.id_column {
            config.input.id_column = column.clone();
        }
    }
}

/// Execute the validate command.
pub async fn execute(args: ValidateArgs, started: DateTime<Local>) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!(
            "Input file does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.input
        );
    }

    let mut config = Config::load()?;
    args.apply(&mut config);
    config.validate()?;

    let dataset = Dataset::load(&args.input, &config.input)?;

    let kind = config.provider.selected;
    let model_override = args.provider.model_override(kind);
    let provider = ProviderFactory::create(kind, &config.provider, model_override.as_deref())?;
    tracing::info!("Using {} provider with model {}", provider.label(), provider.model());

    let settings = RunSettings {
        batch_size: config.batch.batch_size,
        provider: provider.name(),
        model: provider.model(),
        columns: &config.input,
        policy: &config.policy,
    };
    let fingerprint = RunFingerprint::compute(&args.input, &settings)?;
    let plan = RunPlan {
        fingerprint,
        output_path: args
            .output
            .clone()
            .unwrap_or_else(|| config.output_path(started)),
        checkpoint_path: config.checkpoint_path(&args.input),
        resume: !args.fresh,
    };

    let label = provider.label().to_string();
    let validator = Validator::new(provider, RunOptions::from_config(&config), config.policy.clone());

    let stop = validator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let progress = create_progress_bar(batch_count(dataset.len(), config.batch.batch_size) as u64)?;
    let start_time = std::time::Instant::now();

    let outcome = validator
        .run(&dataset, &plan, |event| update_progress(&progress, event))
        .await;
    progress.finish_and_clear();

    match outcome? {
        RunOutcome::Completed(report) => {
            print_summary(&report, &label, start_time.elapsed());
            Ok(())
        }
        RunOutcome::Interrupted {
            output_path,
            checkpoint_path,
            batches_done,
            total_batches,
        } => {
            anyhow::bail!(
                "Interrupted after {batches_done}/{total_batches} batches.\n  \
                 Partial results: {}\n  \
                 Re-run the same command to resume from {}",
                output_path.display(),
                checkpoint_path.display()
            )
        }
    }
}

fn update_progress(progress: &ProgressBar, event: &BatchEvent) {
    match event {
        BatchEvent::Planned { total, resumed } => {
            progress.set_length(*total as u64);
            progress.set_position(*resumed as u64);
        }
        BatchEvent::Started { index, total, rows } => {
            progress.set_message(format!("batch {}/{} ({rows} pharmacies)", index + 1, total));
        }
        BatchEvent::Retrying { attempt, delay, .. } => {
            progress.set_message(format!(
                "retry {attempt} in {:.1}s",
                delay.as_secs_f64()
            ));
        }
        BatchEvent::Finished { outcome, .. } => {
            progress.inc(1);
            if let BatchOutcome::Failed { reason } = outcome {
                progress.set_message(format!("batch failed: {reason}"));
            }
        }
        BatchEvent::Waiting { delay } => {
            progress.set_message(format!("rate limit pause {:.1}s", delay.as_secs_f64()));
        }
    }
}

fn create_progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}",
            )?
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    Ok(pb)
}

/// Print a formatted summary table after a completed run.
fn print_summary(report: &RunReport, label: &str, elapsed: std::time::Duration) {
    let s = &report.summary;

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("          Validation Summary");
    eprintln!("  ====================================");
    eprintln!("    Provider:       {:>10}", label);
    eprintln!("    Total:          {:>10}", s.total);
    eprintln!("    Correct:        {:>10}", s.correct);
    eprintln!("    Incorrect:      {:>10}", s.incorrect);
    eprintln!("    Unknown:        {:>10}", s.unknown);
    eprintln!("    Errors:         {:>10}", s.errors);
    eprintln!("    Success rate:   {:>9.1}%", s.success_rate());
    eprintln!("  ------------------------------------");
    eprintln!("    Batches run:    {:>10}", s.batches_processed);
    if s.batches_resumed > 0 {
        eprintln!("    Resumed:        {:>10}", s.batches_resumed);
    }
    eprintln!("    Batches failed: {:>10}", s.batches_failed);
    eprintln!("    Retries:        {:>10}", s.retries);
    eprintln!("    Duration:       {:>9.1}s", elapsed.as_secs_f64());
    eprintln!("  ====================================");
    eprintln!();
    println!("{}", report.output_path.display());
}
