//! readscope CLI: compose reading assessments, score submissions, and track progress.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "readscope", version, about = "Reading-skills assessment engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and sample question bank
    Init,

    /// Validate question bank TOML files
    Validate {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Compose a test session for one test-taker
    Compose {
        /// Path to a bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Test-taker's name
        #[arg(long)]
        name: String,

        /// Test-taker's age
        #[arg(long)]
        age: u32,

        /// Skill counts, e.g. "title=1,inference=2" (default: config [structure])
        #[arg(long)]
        structure: Option<String>,

        /// RNG seed for a reproducible selection
        #[arg(long)]
        seed: Option<u64>,

        /// One-time access code
        #[arg(long, requires = "codes")]
        code: Option<String>,

        /// Access-code store (JSON)
        #[arg(long)]
        codes: Option<PathBuf>,

        /// Where to write the session JSON (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score a completed session
    Submit {
        /// Submission JSON (session plus responses)
        #[arg(long)]
        submission: PathBuf,

        /// Output directory (default: config output_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, html, all
        #[arg(long, default_value = "json")]
        format: String,

        /// Use the templated narrative without calling a provider
        #[arg(long)]
        no_narrator: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two assessment reports
    Compare {
        /// Earlier report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Later report JSON
        #[arg(long)]
        current: PathBuf,

        /// Percentage points a skill must move to count as changed
        #[arg(long, default_value = "5")]
        threshold: u32,

        /// Exit code 1 if any skill declined
        #[arg(long)]
        fail_on_decline: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Issue one-time access codes
    IssueCodes {
        /// Access-code store (JSON); created if missing
        #[arg(long)]
        codes: PathBuf,

        /// Number of codes to issue
        #[arg(long, default_value = "1")]
        count: u32,
    },

    /// List available narrative models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("readscope_core=info,readscope_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Compose {
            bank,
            name,
            age,
            structure,
            seed,
            code,
            codes,
            output,
            config,
        } => {
            commands::compose::execute(commands::compose::ComposeArgs {
                bank,
                name,
                age,
                structure,
                seed,
                code,
                codes,
                output,
                config,
            })
            .await
        }
        Commands::Submit {
            submission,
            output,
            format,
            no_narrator,
            config,
        } => commands::submit::execute(submission, output, format, no_narrator, config).await,
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_decline,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_decline, format),
        Commands::IssueCodes { codes, count } => commands::issue_codes::execute(codes, count).await,
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
