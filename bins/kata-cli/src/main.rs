mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kata_common::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "kata")]
#[command(about = "Kata - Practice coding problems and check your solutions locally", long_about = None)]
struct Cli {
    /// Engine limits configuration (defaults are used when the file is missing)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Where submissions and solved flags are kept
    #[arg(long, global = true, default_value = commands::DEFAULT_STORE_PATH)]
    store: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List problems in catalog order
    List,

    /// Show a problem's statement, examples and starter code
    Show {
        /// Problem slug (e.g., sum, centerdiv)
        slug: String,

        /// Also print the reference solution
        #[arg(long, default_value = "false")]
        solution: bool,
    },

    /// Evaluate a submission without recording anything
    Run {
        slug: String,

        #[command(flatten)]
        input: commands::SubmissionInput,

        /// Grade every check instead of stopping at the first failure
        #[arg(long, default_value = "false")]
        report: bool,
    },

    /// Save and evaluate a submission; a pass marks the problem solved
    Submit {
        slug: String,

        #[command(flatten)]
        input: commands::SubmissionInput,
    },

    /// Discard saved code and the solved flag for a problem
    Reset { slug: String },

    /// Run every reference solution through the evaluator
    Verify,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("KATA_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let ctx = commands::Context::open(&cli.config, &cli.store, cli.json)?;

    let passed = match cli.command {
        Commands::List => {
            commands::list(&ctx)?;
            true
        }
        Commands::Show { slug, solution } => {
            commands::show(&ctx, &slug, solution)?;
            true
        }
        Commands::Run { slug, input, report } => commands::run(&ctx, &slug, &input, report)?,
        Commands::Submit { slug, input } => commands::submit(&ctx, &slug, &input)?,
        Commands::Reset { slug } => {
            commands::reset(&ctx, &slug)?;
            true
        }
        Commands::Verify => commands::verify(&ctx)?,
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
