use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lrm_roster::output::display::{print_check, print_run_summary, print_team_counts};
use lrm_roster::roster::Ledger;
use lrm_roster::{run_teams, RosterConfig, Runner};

#[derive(Parser)]
#[command(
    name = "lrm-roster",
    version,
    about = "Builds fair locker room monitor rosters from team calendar feeds",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "roster.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Evaluate "now" at this RFC 3339 instant instead of the current time
    #[arg(long, global = true)]
    now: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign monitors and write rosters for the named teams (all when omitted)
    Run {
        teams: Vec<String>,

        /// Also write a machine-readable run summary
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Show how each feed event would be classified, without assigning
    Check { teams: Vec<String> },

    /// Print stored assignment counts
    Counts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = RosterConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let now = match &cli.now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid --now value '{}'", raw))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    match cli.command {
        Commands::Run {
            teams,
            summary_json,
        } => {
            let summary = run_teams(&config, &teams, now).await?;
            print_run_summary(&summary);

            if let Some(path) = summary_json {
                let body = serde_json::to_string_pretty(&summary.to_json())?;
                std::fs::write(&path, body)
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!(path = %path.display(), "Wrote run summary");
            }

            if summary.all_failed() {
                anyhow::bail!("every selected team failed");
            }
        }
        Commands::Check { teams } => {
            let runner = Runner::new(&config)?;
            for team in runner.select(&teams)? {
                match runner.check(team, now).await {
                    Ok(events) => print_check(&team.name, &events, runner.tz(), now),
                    Err(err) => println!("❌ {}", err),
                }
            }
        }
        Commands::Counts => {
            let runner = Runner::new(&config)?;
            let (ledger, report) = Ledger::load(runner.ledger_store());
            if let Some(warning) = report.warning {
                println!("⚠️  {}", warning);
            }
            for team in &config.teams {
                print_team_counts(&team.name, &ledger);
            }
        }
    }

    tracing::debug!("lrm-roster finished");
    Ok(())
}

/// `RUST_LOG` wins when set and valid; `--verbose` only changes the default
fn env_filter(verbose: bool, rust_log: Option<&str>) -> tracing_subscriber::EnvFilter {
    let default_filter = if verbose {
        "lrm_roster=debug,info"
    } else {
        "lrm_roster=info,warn"
    };
    rust_log
        .and_then(|directives| tracing_subscriber::EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(default_filter))
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let rust_log = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    let env_filter = env_filter(verbose, rust_log.as_deref());

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_verbose() {
        assert_eq!(env_filter(true, Some("warn")).to_string(), "warn");
        assert_eq!(env_filter(false, Some("lrm_roster=trace")).to_string(), "lrm_roster=trace");
    }

    #[test]
    fn test_verbose_sets_default() {
        assert!(env_filter(true, None).to_string().contains("lrm_roster=debug"));
        assert!(env_filter(false, None).to_string().contains("lrm_roster=info"));
    }
}
