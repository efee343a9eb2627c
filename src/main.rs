//! Kyper CLI
//!
//! Entry point for the `kyper` command-line tool.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use kyper_cli::commands::{self, CommandError, LoginOptions};
use kyper_cli::config::{default_config_path, CliOverrides, ClientConfig};
use kyper_cli::pipeline::{PushError, PushOptions, PushOrchestrator};
use kyper_cli::prompt::{self, StdinConfirm};
use kyper_cli::ApiClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kyper")]
#[command(about = "Push, validate and manage apps on the Kyper marketplace", version)]
struct Cli {
    /// Output raw JSON (for scripting)
    #[arg(long, global = true)]
    json: bool,

    /// Override API host URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, archive, upload, and tail the build log
    Push,

    /// Stream build logs for the latest version
    Logs,

    /// Show app and latest version status
    Status,

    /// Retry a failed build
    Retry,

    /// Cancel a pending or building version
    Cancel,

    /// Withdraw a version from review
    Withdraw,

    /// Authenticate via browser (device auth flow)
    Login,

    /// Show authenticated user
    Whoami,

    /// Validate kyper.yml locally
    Validate,

    /// Print the CLI version
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let overrides = CliOverrides {
        host: cli.host.clone(),
        json: cli.json,
        verbose: cli.verbose,
    };

    let root = project_root();
    let mut stdout = io::stdout();

    match cli.command {
        Commands::Push => {
            let (client, config) = connect(&overrides);
            run_push(&client, &config)
        }
        Commands::Logs => {
            let (client, config) = connect(&overrides);
            finish(
                commands::logs(&client, &root, config.is_json(), config.tail_timeouts(), &mut stdout)
                    .map(build_exit_code),
            )
        }
        Commands::Status => {
            let (client, config) = connect(&overrides);
            finish(commands::status(&client, &root, config.is_json(), &mut stdout).map(|_| 0))
        }
        Commands::Retry => {
            let (client, config) = connect(&overrides);
            finish(
                commands::retry(&client, &root, config.is_json(), config.tail_timeouts(), &mut stdout)
                    .map(build_exit_code),
            )
        }
        Commands::Cancel => {
            let (client, config) = connect(&overrides);
            finish(commands::cancel(&client, &root, config.is_json(), &mut stdout).map(|_| 0))
        }
        Commands::Withdraw => {
            let (client, config) = connect(&overrides);
            finish(
                commands::withdraw(&client, &root, config.is_json(), &StdinConfirm, &mut stdout)
                    .map(|_| 0),
            )
        }
        Commands::Login => {
            let (client, config) = connect(&overrides);
            run_login(&client, &config)
        }
        Commands::Whoami => {
            let (client, config) = connect(&overrides);
            finish(commands::whoami(&client, config.is_json(), &mut stdout).map(|_| 0))
        }
        // Local only: no configuration or network
        Commands::Validate => {
            finish(commands::validate_project(&root, cli.json, &mut stdout).map(|_| 0))
        }
        Commands::Version => finish(commands::version(cli.json, &mut stdout).map(|_| 0)),
    }
}

/// Resolve configuration and build the API client, exiting on failure
fn connect(overrides: &CliOverrides) -> (ApiClient, ClientConfig) {
    let config = match ClientConfig::load(overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    tracing::debug!(config = %config.redacted(), "configuration resolved");

    match ApiClient::from_config(&config) {
        Ok(client) => (client, config),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

/// stderr only; `--verbose` raises the default, `RUST_LOG` wins
fn init_logging(verbose: bool) {
    let default = if verbose { "kyper_cli=debug,kyper=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn project_root() -> PathBuf {
    PathBuf::from(".")
}

fn build_exit_code(status: kyper_api::VersionStatus) -> i32 {
    if status == kyper_api::VersionStatus::BuildFailed {
        5
    } else {
        0
    }
}

fn finish(result: Result<i32, CommandError>) -> ! {
    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_push(client: &ApiClient, config: &ClientConfig) -> ! {
    let options = PushOptions::from_config(config, project_root());
    let json = options.json;
    let confirm = StdinConfirm;
    let mut orchestrator = PushOrchestrator::new(client, &confirm, options);
    let mut stdout = io::stdout();

    match orchestrator.run(&mut stdout) {
        Ok(outcome) => {
            if json {
                if let Err(e) = commands::print_json(&mut stdout, &outcome) {
                    eprintln!("Error: {}", e);
                    process::exit(e.exit_code());
                }
            }
            let _ = stdout.flush();
            process::exit(outcome.exit_code());
        }
        Err(PushError::Validation(report)) => {
            if json {
                let _ = commands::print_json(&mut stdout, &report);
            } else {
                for error in &report.errors {
                    eprintln!("  FAIL  {}", error);
                }
            }
            let err = PushError::Validation(report);
            eprintln!("Error: {}", err);
            process::exit(err.exit_code());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_login(client: &ApiClient, config: &ClientConfig) -> ! {
    let config_path = match default_config_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let options = LoginOptions {
        config_path,
        timeouts: config.login_timeouts(),
        json: config.is_json(),
        spinner: !config.is_json() && prompt::is_interactive(),
        open_browser: true,
    };

    finish(commands::login(client, &options, &mut io::stdout()).map(|_| 0))
}
