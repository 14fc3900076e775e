//! CLI command definitions

use clap::{Parser, Subcommand};
use spendstore::CartItem;
use std::path::PathBuf;

/// Report request used when `report` is run without `--query`
pub const DEFAULT_REPORT_QUERY: &str = "Generate a detailed financial report based on my supermarket purchases. \
    The report should include: (1) total spending per supermarket, \
    (2) spending breakdown by product category, \
    (3) monthly spending trends for each supermarket. \
    Highlight key insights, top spending areas, and any anomalies or patterns.";

/// marketagent - receipt ingestion and spending questions
#[derive(Parser)]
#[command(name = "ma", about = "Ingest supermarket receipts and ask about your spending", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a receipt (PDF or text) and store its line items
    Ingest {
        /// Receipt document
        path: PathBuf,
    },

    /// Answer one question about your spending
    Ask {
        /// Question in natural language
        question: String,
    },

    /// Generate a markdown spending report
    Report {
        /// What the report should cover
        #[arg(short, long)]
        query: Option<String>,

        /// Session thread the final state is saved under
        #[arg(short, long)]
        thread: Option<String>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the latest saved state of a session thread
    Show {
        #[arg(short, long)]
        thread: String,
    },

    /// Describe the spend database
    Schema,

    /// Compare cart prices across supermarkets
    Cart {
        /// Items as <product>=<quantity>
        #[arg(required = true)]
        items: Vec<CartItem>,
    },
}
