use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use letsencrypt_webfaction::core::error::EXIT_VALIDATION_FAILED;
use letsencrypt_webfaction::domain::normalize_domain_for_display;
use letsencrypt_webfaction::{Cli, Config, PipelineOutcome, run};

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::Warn
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // RUST_LOG still wins when set.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(err.exit_code());
        }
    };

    match run(&config) {
        Ok(PipelineOutcome::Installed(report)) => {
            println!(
                "Certificate {} {} for {}",
                report.cert_name,
                report.action.as_str(),
                report
                    .domains
                    .iter()
                    .map(|d| normalize_domain_for_display(d))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if let Some(summary) = &report.summary {
                println!("  expires: {}", summary.not_after.format("%Y-%m-%d %H:%M UTC"));
                println!("  sha256:  {}", summary.fingerprint);
            }
            for file in &report.exported {
                println!("  {}: {}", file.label, file.path.display());
            }
            ExitCode::SUCCESS
        }
        Ok(PipelineOutcome::ValidationFailed(report)) => {
            eprintln!("Domain validation failed; no certificate was requested.");
            for outcome in report.failed() {
                eprintln!("  {}", outcome.describe());
            }
            ExitCode::from(EXIT_VALIDATION_FAILED)
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
