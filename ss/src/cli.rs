//! CLI argument parsing for spendstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cart::CartItem;

#[derive(Parser, Debug)]
#[command(name = "spendstore")]
#[command(author, version, about = "SQLite store of supermarket receipt line items", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(short, long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    Init,

    /// Describe tables and columns
    Schema,

    /// Run a single SQL statement and print the result
    Query {
        #[arg(required = true)]
        sql: String,

        /// Print as a markdown table
        #[arg(short, long)]
        markdown: bool,
    },

    /// Run a SQL script in one transaction
    Exec {
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Compare cart prices across supermarkets
    Cart {
        /// Items as <product>=<quantity>
        items: Vec<CartItem>,

        /// List products known from past receipts
        #[arg(short, long)]
        list: bool,
    },
}
