//! Spur lookup CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spur_lookup::export::{self, InputTable};
use spur_lookup::{
    run_batch, BatchReport, ClerkAuthenticator, Config, Credentials, GraphQlClient,
    LookupController, RetryPolicy, TokioSleeper,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spur-lookup")]
#[command(about = "Bulk IP context lookups against Spur.us, exported to CSV")]
#[command(version)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account email (overrides the config file and SPUR_EMAIL)
    #[arg(short, long)]
    email: Option<String>,

    /// Directory result files are written into
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up IPs given on the command line, or read a comma-separated list from stdin
    Lookup {
        /// IPs to look up; commas and whitespace both separate entries
        ips: Vec<String>,
    },

    /// Look up every IP in a column of a CSV file
    Csv {
        /// Input CSV file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// IP column, by header name or 1-based number
        #[arg(long)]
        column: String,

        /// Write the input rows with result columns appended instead of a new results file
        #[arg(long)]
        extend: bool,
    },

    /// List the numbered columns of a CSV file
    Columns {
        /// Input CSV file with a header row
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    init_logging(&args)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => Config::default(),
    };
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }

    // Handle --validate
    if args.validate {
        config.validate()?;
        info!("Configuration is valid");
        return Ok(());
    }

    let Some(command) = args.command else {
        anyhow::bail!("No command given; run with --help for usage");
    };

    match command {
        Command::Columns { input } => {
            let table = InputTable::read(&input)?;
            for (idx, header) in table.headers().iter().enumerate() {
                println!("{}. {}", idx + 1, header);
            }
            Ok(())
        }
        Command::Lookup { ips } => {
            let ips = if ips.is_empty() {
                prompt("Enter IP address(es), separated by commas: ")?
                    .split(',')
                    .map(str::to_string)
                    .collect()
            } else {
                ips
            };
            let keys = split_ips(&ips);
            if keys.is_empty() {
                anyhow::bail!("No IP addresses given");
            }

            let report = lookup(&config, args.email.as_deref(), &keys).await?;
            let path = export::write_records(
                &config.output.directory,
                &export::timestamped_filename("spur_results_manual"),
                &report.records,
            )?;
            finish(&report, &path);
            Ok(())
        }
        Command::Csv {
            input,
            column,
            extend,
        } => {
            let table = InputTable::read(&input)?;
            let column = table.column_index(&column)?;
            info!(
                input = %input.display(),
                column = %table.headers()[column],
                rows = table.rows().len(),
                "Loaded input file"
            );

            let values = table.column_values(column);
            let report = lookup(&config, args.email.as_deref(), &values).await?;

            let path = if extend {
                export::write_extended(
                    &config.output.directory,
                    &export::timestamped_filename("spur_results_extended"),
                    &table,
                    column,
                    &report.cache,
                )?
            } else {
                export::write_records(
                    &config.output.directory,
                    &export::timestamped_filename("spur_results_csv"),
                    &report.records,
                )?
            };
            finish(&report, &path);
            Ok(())
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

/// Sign in and run the batch. Authentication failure ends the run.
async fn lookup(config: &Config, email: Option<&str>, keys: &[String]) -> Result<BatchReport> {
    config.validate()?;
    let credentials = collect_credentials(config, email)?;

    info!(email = %credentials.identifier(), "Authenticating");
    let controller = LookupController::connect(
        Box::new(ClerkAuthenticator::new(config.service.clone())),
        Box::new(GraphQlClient::new(config.service.clone())),
        Arc::new(TokioSleeper::new()),
        credentials,
        RetryPolicy::from(&config.retry),
    )
    .await;

    let mut controller = match controller {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "Authentication failed, halting");
            return Err(e).context("Authentication failed");
        }
    };

    let delay = Duration::from_secs(config.retry.inter_query_delay_seconds);
    Ok(run_batch(&mut controller, keys, delay).await)
}

fn finish(report: &BatchReport, path: &Path) {
    println!("{}", report.summary);
    println!("Results written to {}", path.display());
}

/// Password prompt; typed input stays visible on the terminal.
const PASSWORD_PROMPT: &str =
    "Spur.us password (input will be visible; set SPUR_PASSWORD to avoid this): ";

/// Email from the flag, then config, then SPUR_EMAIL, then a prompt.
/// Password from SPUR_PASSWORD, then a prompt.
fn collect_credentials(config: &Config, email: Option<&str>) -> Result<Credentials> {
    let email = match email
        .map(str::to_string)
        .or_else(|| config.credentials.email().map(str::to_string))
        .or_else(|| non_blank_env("SPUR_EMAIL"))
    {
        Some(email) => email,
        None => prompt("Spur.us email: ")?,
    };

    let password = match non_blank_env("SPUR_PASSWORD") {
        Some(password) => password,
        None => {
            warn!("SPUR_PASSWORD is not set; the password prompt echoes what is typed");
            prompt(PASSWORD_PROMPT)?
        }
    };

    if email.trim().is_empty() || password.is_empty() {
        anyhow::bail!("Email and password are required");
    }

    Ok(Credentials::new(email.trim(), password))
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn prompt(message: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{}", message)?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Split arguments on commas and whitespace, dropping empties.
fn split_ips(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| arg.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .collect()
}
