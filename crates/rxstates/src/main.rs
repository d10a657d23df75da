//! rxstates CLI - Validate mail-order pharmacy states of operation with AI.
//!
//! Reads a CSV of pharmacies, asks a search-grounded AI provider whether each
//! pharmacy really operates in the states it claims, and writes the CSV back
//! out with a verdict, corrected states, confidence and reasoning per row.
//!
//! # Usage
//!
//! ```bash
//! # Validate a file with the default provider (OpenAI deep research)
//! rxstates validate pharmacies.csv
//!
//! # Use Gemini with smaller batches
//! rxstates validate pharmacies.csv --provider google --batch-size 10
//!
//! # Smoke-test the configured provider with one sample pharmacy
//! rxstates check
//!
//! # View configuration
//! rxstates config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// rxstates - Validate pharmacy states of operation against search-grounded AI.
#[derive(Parser, Debug)]
#[command(name = "rxstates")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate every pharmacy in a CSV file
    Validate(cli::validate::ValidateArgs),

    /// Send one sample pharmacy to the provider and print the result
    Check(cli::check::CheckArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let started = chrono::Local::now();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match rxstates_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `rxstates config path`."
            );
            rxstates_core::Config::default()
        }
    };
    let log_path = matches!(cli.command, Commands::Validate(_)).then(|| config.log_path(started));
    logging::init_from_config(&config, cli.verbose, cli.json_logs, log_path.as_deref());

    tracing::debug!("rxstates v{}", rxstates_core::VERSION);

    match cli.command {
        Commands::Validate(args) => cli::validate::execute(args, started).await,
        Commands::Check(args) => cli::check::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validate_with_global_flags() {
        let cli = Cli::try_parse_from([
            "rxstates",
            "validate",
            "pharmacies.csv",
            "--provider",
            "google",
            "--batch-size",
            "10",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.input, std::path::PathBuf::from("pharmacies.csv"));
                assert_eq!(args.batch_size, Some(10));
                assert!(matches!(
                    args.provider.provider,
                    Some(cli::provider::ProviderChoice::Google)
                ));
            }
            other => panic!("expected validate, got {other:?}"),
        }
    }

    #[test]
    fn validate_requires_input() {
        assert!(Cli::try_parse_from(["rxstates", "validate"]).is_err());
    }

    #[test]
    fn parses_config_init_force() {
        let cli = Cli::try_parse_from(["rxstates", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(cli::config::ConfigArgs {
                command: cli::config::ConfigCommand::Init { force: true }
            })
        ));
    }
}
