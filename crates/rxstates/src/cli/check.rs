//! The `rxstates check` command: one sample pharmacy through the full
//! provider → parser path, without touching any files.

use super::provider::ProviderArgs;
use clap::Args;
use rxstates_core::{parse_reply, Batch, Config, Dataset, ProviderFactory, ValidationProvider};

/// Arguments for the `check` command.
#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Also print the raw provider reply
    #[arg(long)]
    pub raw: bool,
}

/// Execute the check command.
pub async fn execute(args: CheckArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    args.provider.apply(&mut config);
    config.validate()?;

    let kind = config.provider.selected;
    let model_override = args.provider.model_override(kind);
    let provider = ProviderFactory::create(kind, &config.provider, model_override.as_deref())?;

    let sample = Dataset::sample()?;
    let batch = Batch::new(0, sample.records);

    println!("Testing {} provider ({})...", provider.label(), provider.model());
    println!("{}", "=".repeat(50));

    let reply = match tokio::time::timeout(provider.timeout(), provider.validate_batch(&batch)).await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => return Err(troubleshoot(e.into(), kind.key_env_var())),
        Err(_) => {
            return Err(troubleshoot(
                anyhow::anyhow!("request timed out after {:?}", provider.timeout()),
                kind.key_env_var(),
            ))
        }
    };

    if args.raw {
        println!("{}", reply.text);
        println!("{}", "-".repeat(50));
    }

    let parsed = parse_reply(&reply.text, &batch, &config.policy)?;
    for result in &parsed.results {
        println!("Pharmacy:    {} ({})", result.record.name, result.record.id);
        println!("Claimed:     {}", result.record.claimed_raw);
        println!("Correct:     {}", result.initial_correct);
        if !result.corrected_states.is_empty() {
            println!("Corrected:   {}", result.corrected_states.join(", "));
        }
        println!("Confidence:  {}", result.confidence);
        println!("Reasoning:   {}", result.reasoning);
    }
    println!(
        "\nProvider check passed ({} ms, {:?} parse, {} grounding sources)",
        reply.latency_ms, parsed.stage, reply.grounding_sources
    );
    Ok(())
}

fn troubleshoot(error: anyhow::Error, key_env_var: &str) -> anyhow::Error {
    error.context(format!(
        "Provider check failed.\n\nTroubleshooting:\n  \
         1. Check that {key_env_var} is set correctly\n  \
         2. Verify the model name is available to your account\n  \
         3. Check network access to the provider endpoint"
    ))
}
