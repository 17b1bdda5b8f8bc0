//! labj - append-only lab journal
//!
//! Command-line front-end for the journal engine: query, search, stats,
//! active-operation scan, export, and index recovery.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use labj_core::JournalError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// labj - append-only lab journal
#[derive(Parser, Debug)]
#[command(name = "labj")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root directory
    #[arg(short = 'C', long, default_value = ".")]
    project_root: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Create the journal, configs, logs, and snapshots directories
    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query entries with filters, text search, and pagination
    Query {
        /// Equality filters as key=value (author, outcome, entry_type,
        /// template, tool, error_type)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Full-text search over the narrative fields
        #[arg(short, long)]
        text: Option<String>,

        /// Start date (YYYY-MM-DD, today, yesterday)
        #[arg(long)]
        date_from: Option<String>,

        /// End date (YYYY-MM-DD, today, yesterday)
        #[arg(long)]
        date_to: Option<String>,

        /// Maximum entries to return
        #[arg(short = 'n', long, default_value = "100")]
        limit: u64,

        /// Entries to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Ordering field (timestamp, entry_id, author, outcome, duration_ms)
        #[arg(long)]
        order_by: Option<String>,

        /// Ascending order (default is descending)
        #[arg(long)]
        asc: bool,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Full-text search (shorthand for query --text)
    Search {
        /// Search text
        query: String,

        /// Filter by author
        #[arg(short, long)]
        author: Option<String>,

        /// Start date
        #[arg(long)]
        date_from: Option<String>,

        /// End date
        #[arg(long)]
        date_to: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Overall or grouped statistics
    Stats {
        /// Group by field (tool, outcome, author, template, date,
        /// entry_type, error_type)
        #[arg(short, long)]
        group_by: Option<String>,

        /// Aggregations: count or {avg|sum|min|max}:{field}
        #[arg(short, long)]
        agg: Vec<String>,

        /// Equality filters as key=value
        #[arg(short, long)]
        filter: Vec<String>,

        /// Start date
        #[arg(long)]
        date_from: Option<String>,

        /// End date
        #[arg(long)]
        date_to: Option<String>,
    },

    /// Entries with long recorded durations
    Active {
        /// Duration threshold in milliseconds
        #[arg(short, long, default_value = "30000")]
        threshold_ms: u64,

        /// Restrict to one tool
        #[arg(long)]
        tool: Option<String>,
    },

    /// Export entries in a machine-readable format
    Export {
        /// Output format
        #[arg(short = 'F', long, value_enum, default_value = "table")]
        format: ExportFormat,

        /// Start date
        #[arg(long)]
        date_from: Option<String>,

        /// End date
        #[arg(long)]
        date_to: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild the SQLite index from the daily markdown files
    RebuildIndex,
}

/// Export output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    /// Aligned text table
    Table,
    /// Pretty-printed JSON array
    Json,
    /// One JSON object per line
    Jsonl,
    /// Comma-separated values with a header row
    Csv,
    /// One terse line per entry
    Compact,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err} ({})", err.kind());
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<(), JournalError> {
    if cli.init {
        return commands::init::run(&cli.project_root);
    }

    let Some(command) = cli.command else {
        return Err(JournalError::invalid(
            "no command given; see --help (or --init to set up a project)",
        ));
    };

    let engine = labj_core::JournalEngine::open(&cli.project_root)?;

    match command {
        Commands::Query {
            filter,
            text,
            date_from,
            date_to,
            limit,
            offset,
            order_by,
            asc,
            json,
        } => commands::query::run(
            &engine,
            &filter,
            text.as_deref(),
            date_from.as_deref(),
            date_to.as_deref(),
            limit,
            offset,
            order_by.as_deref(),
            !asc,
            json,
        ),
        Commands::Search {
            query,
            author,
            date_from,
            date_to,
            json,
        } => commands::search::run(
            &engine,
            &query,
            author.as_deref(),
            date_from.as_deref(),
            date_to.as_deref(),
            json,
        ),
        Commands::Stats {
            group_by,
            agg,
            filter,
            date_from,
            date_to,
        } => commands::stats::run(
            &engine,
            group_by.as_deref(),
            &agg,
            &filter,
            date_from.as_deref(),
            date_to.as_deref(),
        ),
        Commands::Active { threshold_ms, tool } => {
            commands::active::run(&engine, threshold_ms, tool.as_deref())
        }
        Commands::Export {
            format,
            date_from,
            date_to,
            output,
        } => commands::export::run(
            &engine,
            format,
            date_from.as_deref(),
            date_to.as_deref(),
            output.as_deref(),
        ),
        Commands::RebuildIndex => commands::rebuild::run(&engine),
    }
}
