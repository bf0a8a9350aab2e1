mod export;
mod run;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "adgrab")]
#[command(about = "Ad archive collection pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AdTypeArg {
    All,
    Political,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AdStatusArg {
    All,
    Active,
    Inactive,
}

#[derive(Debug, clap::Args)]
struct QueryArgs {
    /// ISO 3166-1 alpha-2 country codes the ads must have reached.
    #[arg(long, value_delimiter = ',')]
    countries: Vec<String>,

    /// Free-text search over ad creative content.
    #[arg(long)]
    search_terms: Option<String>,

    /// Restrict results to these advertiser page ids.
    #[arg(long, value_delimiter = ',')]
    page_ids: Vec<String>,

    /// Earliest delivery date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    date_min: Option<NaiveDate>,

    /// Latest delivery date, inclusive (YYYY-MM-DD).
    #[arg(long)]
    date_max: Option<NaiveDate>,

    #[arg(long, value_enum, default_value = "all")]
    ad_type: AdTypeArg,

    #[arg(long, value_enum, default_value = "all")]
    ad_status: AdStatusArg,
}

#[derive(Debug, clap::Args)]
struct TuningArgs {
    /// Concurrent media downloads.
    #[arg(long)]
    workers: Option<usize>,

    /// Archive requests allowed per rate window.
    #[arg(long)]
    rate_limit: Option<usize>,

    /// Length of the archive rate window in seconds.
    #[arg(long)]
    rate_window_secs: Option<u64>,

    /// Retry budget for transient failures.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Hard cap on archive pages for this run.
    #[arg(long)]
    max_pages: Option<usize>,

    /// Output directory (overrides ADGRAB_OUT_DIR).
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start a new collection run.
    Run {
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Continue a run from its persisted state file.
    Resume {
        /// Path to the run_state.json written by a previous run.
        #[arg(long)]
        state: PathBuf,
        /// Fail instead of restarting from page one when the archive
        /// no longer honors the persisted cursor.
        #[arg(long)]
        strict: bool,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Re-materialize a collected dataset in another format.
    Export {
        /// Directory written by a previous run.
        #[arg(long)]
        dataset: PathBuf,
        /// Output format (only `jsonl` for now).
        #[arg(long, default_value = "jsonl")]
        format: String,
        /// Output file; defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { query, tuning } => {
            let config = load_config()?;
            run::run_new(&config, &query, &tuning).await
        }
        Commands::Resume {
            state,
            strict,
            tuning,
        } => {
            let config = load_config()?;
            run::run_resume(&config, &state, strict, &tuning).await
        }
        Commands::Export {
            dataset,
            format,
            out,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_default())
                .init();
            export::run_export(&dataset, &format, out.as_deref())
        }
    }
}

fn load_config() -> anyhow::Result<adgrab_core::AppConfig> {
    let config = adgrab_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(config)
}
