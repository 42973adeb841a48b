//! chartdep CLI - resolve, fetch and verify chart dependencies

use chartdep_repo::home::HOME_ENV;
use chartdep_repo::{DEFAULT_CONCURRENCY, Home, UpdateOptions};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod display;
mod error;
mod exit_codes;

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "chartdep")]
#[command(version)]
#[command(about = "Resolve, fetch and verify chart dependencies", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Directory holding repositories.yaml and the index cache
    #[arg(long, global = true, env = HOME_ENV)]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage chart repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Manage a chart's dependencies
    #[command(alias = "dep")]
    Dependency {
        #[command(subcommand)]
        command: DependencyCommands,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a chart repository
    Add {
        /// Repository name
        name: String,

        /// Repository URL (http(s):// or file://)
        url: String,
    },

    /// List chart repositories
    List,

    /// Remove a chart repository
    Remove {
        /// Repository name
        name: String,
    },

    /// Refresh the cached index of every repository
    Update {
        /// Seconds to wait for each index
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum DependencyCommands {
    /// Update charts/ from requirements.yaml and write requirements.lock
    Update {
        /// Chart path
        #[arg(default_value = ".")]
        chart: PathBuf,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Rebuild charts/ from requirements.lock
    Build {
        /// Chart path
        #[arg(default_value = ".")]
        chart: PathBuf,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// List dependencies and their status
    List {
        /// Chart path
        #[arg(default_value = ".")]
        chart: PathBuf,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Do not refresh the repository indices first
    #[arg(long)]
    skip_refresh: bool,

    /// Seconds to wait for each index refresh and download
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Maximum concurrent downloads
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

impl FetchArgs {
    fn options(&self) -> UpdateOptions {
        UpdateOptions {
            skip_refresh: self.skip_refresh,
            timeout: Duration::from_secs(self.timeout),
            concurrency: self.concurrency,
        }
    }
}

/// Log to stderr so progress on stdout stays clean
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(debug)
                .with_ansi(std::env::var_os("NO_COLOR").is_none()),
        )
        .with(filter)
        .init();
}

fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli) {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let home = match cli.home {
        Some(root) => Home::new(root),
        None => Home::from_env()?,
    };
    tracing::debug!(home = %home.root().display(), "using home");

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("failed to start runtime: {}", e)))?;

    match cli.command {
        Commands::Repo { command } => match command {
            RepoCommands::Add { name, url } => commands::repo::add(&home, &name, &url),
            RepoCommands::List => commands::repo::list(&home),
            RepoCommands::Remove { name } => commands::repo::remove(&home, &name),
            RepoCommands::Update { timeout } => {
                runtime.block_on(commands::repo::update(&home, Duration::from_secs(timeout)))
            }
        },

        Commands::Dependency { command } => match command {
            DependencyCommands::Update { chart, fetch } => {
                runtime.block_on(commands::dep::update(&home, &chart, &fetch.options()))
            }
            DependencyCommands::Build { chart, fetch } => {
                runtime.block_on(commands::dep::build(&home, &chart, &fetch.options()))
            }
            DependencyCommands::List { chart } => commands::dep::list(&chart),
        },
    }
}
